use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rosterlink_rs::model::{Identity, RosterRecord};

// Distinct initials and two-letter prefixes, so two different names never
// share an initial-based handle or a canonical handle.
const FIRST_NAMES: [&str; 12] = [
    "John", "Mary", "Ann", "Robert", "Linda", "Patricia", "David", "Susan", "Karen", "Thomas",
    "Emily", "George",
];

const LAST_NAMES: [&str; 12] = [
    "Smith", "O'Brien", "Lee", "Clark", "Garcia", "Miller", "Davis", "Rodriguez", "Martinez",
    "Wilson", "Anderson", "Taylor",
];

const DOMAINS: [&str; 4] = ["test.com", "league.org", "mail.example", "legacy.org"];

#[derive(Debug, Clone)]
pub struct GeneratedRoster {
    pub identities: Vec<Identity>,
    pub records: Vec<RosterRecord>,
    /// Records whose handle was generated in a recognizable shape.
    #[allow(dead_code)]
    pub expected_matches: usize,
}

/// Handle for `first`/`last` in one of several shapes people actually use.
fn handle_for(rng: &mut StdRng, first: &str, last: &str) -> String {
    let first = first.to_lowercase().replace('\'', "");
    let last = last.to_lowercase().replace('\'', "");
    let initial = &first[..1];
    let local = match rng.random_range(0..8) {
        0 => format!("{first}.{last}"),
        1 => format!("{first}_{last}"),
        2 => format!("{initial}{last}"),
        3 => format!("{}{first}.{last}", rng.random_range(1..100)),
        4 => format!("{last}.{first}"),
        5 => format!("{first}{last}"),
        6 => format!("{initial}.{last}"),
        _ => format!("{first}{}", &last[..1]),
    };
    let domain = DOMAINS[rng.random_range(0..DOMAINS.len())];
    format!("{local}@{domain}")
}

/// Synthetic roster of `count` people. `match_probability` controls how many
/// get an identity whose handle follows their name; the rest get an opaque
/// handle that nothing should match.
pub fn generate_roster(count: u32, match_probability: f64, seed: u64) -> GeneratedRoster {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut identities = Vec::with_capacity(count as usize);
    let mut records = Vec::with_capacity(count as usize);
    let mut expected_matches = 0;

    for i in 1..=count {
        let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
        let record_id = format!("doc_{:06}", i);
        records.push(RosterRecord::new(record_id, first, last));

        let identity_id = format!("uid_{:06}", i);
        let handle = if rng.random_bool(match_probability) {
            expected_matches += 1;
            handle_for(&mut rng, first, last)
        } else {
            format!("user{:06}@opaque.example", i)
        };
        identities.push(Identity::new(identity_id, handle));
    }

    GeneratedRoster {
        identities,
        records,
        expected_matches,
    }
}

/// Identities whose handles fit no name shape, used to pad an index.
#[allow(dead_code)]
pub fn generate_noise(count: u32, seed: u64) -> Vec<Identity> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count)
        .map(|i| {
            let handle = format!("zz{:08}q@noise.example", rng.random_range(0..100_000_000u32));
            Identity::new(format!("noise_{:06}", i), handle)
        })
        .collect()
}
