//! Content fingerprint used as a backup's checksum.
//!
//! The fingerprint is the sum of the UTF-16 code units of the payload's
//! canonical serialization (compact JSON, object keys sorted), rendered as
//! lowercase hexadecimal. It catches corruption and casual edits; it is not a
//! cryptographic hash and does not resist forgery.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Root field holding the fingerprint; excluded when computing it.
pub const CHECKSUM_FIELD: &str = "checksum";

/// Serializes a JSON value with sorted object keys, optionally leaving out
/// one key of the outermost object.
struct Canonical<'a> {
    value: &'a Value,
    skip: Option<&'a str>,
}
impl<'a> Canonical<'a> {
    fn new(value: &'a Value) -> Self {
        Self { value, skip: None }
    }
}
impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().filter(|(key, _)| Some(key.as_str()) != self.skip).collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Canonical::new(value))?;
                }
                out.end()
            },
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical::new)),
            scalar => scalar.serialize(serializer),
        }
    }
}

/// Canonical serialization of `payload` without its checksum field.
pub fn canonical_json(payload: &Value) -> Result<String> {
    let canonical = Canonical {
        value: payload,
        skip: Some(CHECKSUM_FIELD),
    };
    serde_json::to_string(&canonical).or_raise(|| ErrorKind::Serialize)
}

/// Fingerprint of `payload`, ignoring any existing checksum field.
///
/// Deterministic: field order and whitespace in the original input make no
/// difference.
pub fn compute_fingerprint(payload: &Value) -> Result<String> {
    canonical_json(payload).map(|json| fold(&json))
}

fn fold(text: &str) -> String {
    let sum = text
        .encode_utf16()
        .fold(0u64, |acc, unit| acc.wrapping_add(u64::from(unit)));
    format!("{sum:x}")
}
