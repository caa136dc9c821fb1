use crate::checksum::compute_fingerprint;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use libris_store::{Book, Loan, Snapshot, Student};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

/// Format version written into new backups.
pub const FORMAT_VERSION: &str = "1.0";

/// A full copy of the record store, as written to a backup file.
///
/// The `checksum` is the fingerprint of every other field; see
/// [`compute_fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: String,
    /// ISO-8601 timestamp of the export.
    pub export_timestamp: String,
    pub record_count: u64,
    pub books: Vec<Book>,
    pub students: Vec<Student>,
    pub loans: Vec<Loan>,
    pub checksum: String,
}

impl Backup {
    /// Build a backup of `snapshot`, stamped with the current time.
    pub fn create(snapshot: Snapshot) -> Result<Self> {
        Self::create_at(snapshot, OffsetDateTime::now_utc())
    }

    /// Build a backup of `snapshot` with an explicit export time.
    #[instrument(skip(snapshot), fields(records = snapshot.record_count()))]
    pub fn create_at(snapshot: Snapshot, exported_at: OffsetDateTime) -> Result<Self> {
        let export_timestamp = exported_at.format(&Rfc3339).or_raise(|| ErrorKind::Serialize)?;
        let mut backup = Self {
            version: FORMAT_VERSION.to_string(),
            export_timestamp,
            record_count: snapshot.record_count() as u64,
            books: snapshot.books,
            students: snapshot.students,
            loans: snapshot.loans,
            checksum: String::new(),
        };
        let payload = serde_json::to_value(&backup).or_raise(|| ErrorKind::Serialize)?;
        backup.checksum = compute_fingerprint(&payload)?;
        Ok(backup)
    }

    /// Serialize for writing to a file.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        match pretty {
            true => serde_json::to_string_pretty(self),
            false => serde_json::to_string(self),
        }
        .or_raise(|| ErrorKind::Serialize)
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// The records to restore, without the backup's metadata.
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            books: self.books,
            students: self.students,
            loans: self.loans,
        }
    }
}
