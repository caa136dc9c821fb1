//! Structural validation of backup files.
//!
//! Checks run in a fixed order and the first failure is reported:
//!
//! 1. root fields present ([`ErrorKind::MalformedRoot`])
//! 2. collections are lists ([`ErrorKind::CorruptCollections`])
//! 3. record count matches ([`ErrorKind::CountMismatch`])
//! 4. checksum matches ([`ErrorKind::ChecksumMismatch`])
//! 5. records carry their required fields ([`ErrorKind::MissingField`])
//! 6. records decode into their types ([`ErrorKind::InvalidField`])
//!
//! A field holding `null` counts as missing.

use crate::backup::{Backup, FORMAT_VERSION};
use crate::checksum::{CHECKSUM_FIELD, compute_fingerprint};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use libris_store::{Book, Collection, Loan, Student};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

/// Fields every record of a collection must carry.
pub fn required_fields(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Books => &["id", "title", "author", "isbn", "totalCopies", "availableCopies"],
        Collection::Students => &["id", "name", "registrationNumber", "className"],
        Collection::Loans => &["id", "bookId", "studentId", "loanDate", "dueDate", "status"],
    }
}

fn defined<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

/// Parse raw backup text. Syntax errors are [`ErrorKind::ParseError`].
pub fn parse_backup(input: &str) -> Result<Value> {
    serde_json::from_str(input).or_raise(|| ErrorKind::ParseError)
}

/// Parse then validate raw backup text.
pub fn read_backup(input: &str) -> Result<Backup> {
    validate_backup(&parse_backup(input)?)
}

/// Validate a parsed backup and decode it.
#[instrument(skip_all)]
pub fn validate_backup(payload: &Value) -> Result<Backup> {
    let root = payload.as_object().ok_or_raise(|| ErrorKind::MalformedRoot("version"))?;
    let version = root_field(root, "version")?;
    let export_timestamp = root_field(root, "exportTimestamp")?;
    let declared = root_field(root, "recordCount")?;
    let checksum = root_field(root, CHECKSUM_FIELD)?;

    let books = records(root, Collection::Books)?;
    let students = records(root, Collection::Students)?;
    let loans = records(root, Collection::Loans)?;

    let actual = (books.len() + students.len() + loans.len()) as u64;
    let record_count = declared
        .as_u64()
        .filter(|count| *count == actual)
        .ok_or_raise(|| ErrorKind::CountMismatch {
            declared: declared.to_string(),
            actual,
        })?;

    let computed = compute_fingerprint(payload)?;
    if checksum.as_str() != Some(computed.as_str()) {
        exn::bail!(ErrorKind::ChecksumMismatch);
    }

    check_required_fields(Collection::Books, books)?;
    check_required_fields(Collection::Students, students)?;
    check_required_fields(Collection::Loans, loans)?;

    let version = value_to_text(version);
    if version != FORMAT_VERSION {
        warn!(%version, expected = FORMAT_VERSION, "unexpected backup format version");
    }
    Ok(Backup {
        version,
        export_timestamp: value_to_text(export_timestamp),
        record_count,
        books: decode::<Book>(Collection::Books, books, |_| true)?,
        students: decode::<Student>(Collection::Students, students, |_| true)?,
        loans: decode(Collection::Loans, loans, Loan::status_matches_return_date)?,
        checksum: computed,
    })
}

fn root_field<'a>(root: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value> {
    defined(root, field).ok_or_raise(|| ErrorKind::MalformedRoot(field))
}

fn records<'a>(root: &'a Map<String, Value>, collection: Collection) -> Result<&'a [Value]> {
    defined(root, collection.as_str())
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_raise(|| ErrorKind::CorruptCollections(collection))
}

fn check_required_fields(collection: Collection, records: &[Value]) -> Result<()> {
    let fields = required_fields(collection);
    for (index, record) in records.iter().enumerate() {
        let missing = match record.as_object() {
            Some(object) => fields.iter().copied().find(|field| defined(object, field).is_none()),
            None => fields.first().copied(),
        };
        if let Some(field) = missing {
            exn::bail!(ErrorKind::MissingField {
                collection,
                index,
                field,
            });
        }
    }
    Ok(())
}

/// Decode every record, rejecting any that fails to deserialize or that
/// `accept` turns down.
fn decode<R: DeserializeOwned>(collection: Collection, records: &[Value], accept: fn(&R) -> bool) -> Result<Vec<R>> {
    let mut decoded = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let record = R::deserialize(record).or_raise(|| ErrorKind::InvalidField { collection, index })?;
        if !accept(&record) {
            exn::bail!(ErrorKind::InvalidField { collection, index });
        }
        decoded.push(record);
    }
    Ok(decoded)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
