//! # Normalization
//!
//! Comparison tokens for names and login handles. Tokens are only ever used
//! for matching; nothing produced here is displayed or stored, except
//! [`canonical_handle`].

/// Domain separator inside a login handle.
pub const DOMAIN_SEPARATOR: char = '@';

/// Lower-case `raw` and drop every character outside `a-z`.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

/// Lower-case, drop `.` characters, and collapse a `+alias` segment that
/// precedes the domain separator.
///
/// `"Mary.OBrien+roster@Test.com"` becomes `"maryobrien@testcom"`.
pub fn normalize_handle(raw: &str) -> String {
    fold_handle(raw).chars().filter(|&c| c != '.').collect()
}

/// Lower-case and collapse the `+alias` segment, keeping separators.
///
/// Structural shapes such as `first.last` need the dots that
/// [`normalize_handle`] removes.
pub fn fold_handle(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    match lowered.find(DOMAIN_SEPARATOR) {
        Some(at) => {
            let (local, domain) = lowered.split_at(at);
            match local.find('+') {
                Some(plus) => format!("{}{}", &local[..plus], domain),
                None => lowered,
            }
        }
        None => lowered,
    }
}

/// Portion of a handle before the first domain separator, or the whole string.
pub fn local_part(handle: &str) -> &str {
    match handle.find(DOMAIN_SEPARATOR) {
        Some(at) => &handle[..at],
        None => handle,
    }
}

/// Handle the engine prefers once an identity is linked: the first two
/// characters of the given name followed by the family name, lower-cased,
/// at `domain`.
pub fn canonical_handle(first_name: &str, last_name: &str, domain: &str) -> String {
    let prefix: String = first_name.chars().take(2).collect();
    format!(
        "{}{}@{}",
        prefix.to_lowercase(),
        last_name.to_lowercase(),
        domain.trim_start_matches(DOMAIN_SEPARATOR)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keeps_only_ascii_letters() {
        assert_eq!(normalize_name("O'Brien"), "obrien");
        assert_eq!(normalize_name("Mary-Jo 2nd"), "maryjond");
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("123 !"), "");
    }

    #[test]
    fn handle_strips_dots_and_alias() {
        assert_eq!(normalize_handle("John.Smith+ref@Test.com"), "johnsmith@testcom");
        assert_eq!(normalize_handle("jsmith@test.com"), "jsmith@testcom");
        assert_eq!(normalize_handle(""), "");
    }

    #[test]
    fn alias_after_domain_is_kept() {
        assert_eq!(fold_handle("a.b@x+y.com"), "a.b@x+y.com");
        assert_eq!(fold_handle("doc+1"), "doc+1");
    }

    #[test]
    fn local_part_without_separator_is_whole_string() {
        assert_eq!(local_part("doc12345"), "doc12345");
        assert_eq!(local_part("john.smith@test.com"), "john.smith");
    }

    #[test]
    fn canonical_handle_uses_two_letter_prefix() {
        assert_eq!(canonical_handle("John", "Smith", "test.com"), "josmith@test.com");
        assert_eq!(canonical_handle("J", "Smith", "@test.com"), "jsmith@test.com");
    }
}
