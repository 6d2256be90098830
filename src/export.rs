//! # Identity Export
//!
//! CSV export of the credential store and handle-index seeding from such an
//! export. Only the `uid` and `email` columns are read back; other columns
//! are ignored.

use crate::index::HandleIndex;
use crate::model::{Identity, IdentityId};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

pub const ID_COLUMN: &str = "uid";
pub const HANDLE_COLUMN: &str = "email";

const EXPORT_HEADER: [&str; 5] = [ID_COLUMN, HANDLE_COLUMN, "emailVerified", "disabled", "creationTime"];

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    uid: &'a str,
    email: &'a str,
    #[serde(rename = "emailVerified")]
    email_verified: bool,
    disabled: bool,
    #[serde(rename = "creationTime")]
    creation_time: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImportRow {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    email: String,
}

/// Rows read from an export and the index built from the usable ones.
#[derive(Debug)]
pub struct ExportIndex {
    pub index: HandleIndex,
    pub valid_rows: usize,
    pub invalid_rows: usize,
}

/// Write `identities` as CSV. The header row is written even when there are
/// no identities, so an empty export still reads back.
pub fn write_export<W: Write>(identities: &[Identity], writer: W) -> Result<usize> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(EXPORT_HEADER)?;
    for identity in identities {
        csv.serialize(ExportRow {
            uid: identity.id.as_str(),
            email: identity.handle().unwrap_or(""),
            email_verified: identity.verified,
            disabled: identity.disabled,
            creation_time: identity.created_at.as_deref().unwrap_or(""),
        })?;
    }
    csv.flush()?;
    Ok(identities.len())
}

pub fn write_export_file(identities: &[Identity], path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating export {}", path.display()))?;
    let written = write_export(identities, file)?;
    info!(path = %path.display(), identities = written, "Exported identities");
    Ok(written)
}

/// Read an export and build a handle index from rows that carry both an id
/// and a handle. Rows are indexed in identity-id order.
pub fn read_export<R: Read>(reader: R) -> Result<ExportIndex> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv.headers()?.clone();
    for column in [ID_COLUMN, HANDLE_COLUMN] {
        if !headers.iter().any(|header| header == column) {
            bail!("export header is missing the {column} column");
        }
    }

    let mut pairs = Vec::new();
    let mut invalid_rows = 0usize;
    for row in csv.deserialize::<ImportRow>() {
        let row = row?;
        if row.uid.is_empty() || row.email.is_empty() {
            invalid_rows += 1;
            continue;
        }
        pairs.push((IdentityId::new(row.uid), row.email));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let valid_rows = pairs.len();

    Ok(ExportIndex {
        index: HandleIndex::from_pairs(pairs),
        valid_rows,
        invalid_rows,
    })
}

pub fn read_export_file(path: &Path) -> Result<ExportIndex> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening export {}", path.display()))?;
    let export = read_export(file).with_context(|| format!("reading export {}", path.display()))?;
    info!(
        path = %path.display(),
        valid = export.valid_rows,
        invalid = export.invalid_rows,
        "Loaded handle mappings from export"
    );
    Ok(export)
}
