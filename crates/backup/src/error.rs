//! Backup Error Types
//!
//! Validation failures are reported in the order the checks run; the first
//! failing check wins. Import failures distinguish a recoverable rollback from
//! a failed one, see [`ErrorKind::is_fatal`].

use derive_more::{Display, Error};
use libris_store::Collection;
use libris_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};

/// A backup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input is not syntactically valid JSON.
    #[display("backup is not valid JSON")]
    ParseError,
    /// A root field is absent (or `null`), or the root is not an object.
    #[display("malformed backup: missing root field {_0}")]
    MalformedRoot(#[error(not(source))] &'static str),
    #[display("corrupt backup: {_0} is not a list of records")]
    CorruptCollections(#[error(not(source))] Collection),
    #[display("record count {declared} does not match the {actual} records in the backup")]
    CountMismatch { declared: String, actual: u64 },
    /// Covers both tampering and accidental corruption.
    #[display("backup checksum does not match its contents")]
    ChecksumMismatch,
    #[display("{collection} record {index} is missing field {field}")]
    MissingField {
        collection: Collection,
        index: usize,
        field: &'static str,
    },
    /// A field is present but holds a value of the wrong type or range.
    #[display("{collection} record {index} has an invalid field")]
    InvalidField { collection: Collection, index: usize },
    /// The record store failed outside of an import.
    #[display("record store error: {_0}")]
    Store(StoreErrorKind),
    /// The current contents could not be captured, so nothing was replaced.
    #[display("could not snapshot the current records")]
    Snapshot,
    #[display("could not serialize backup")]
    Serialize,
    /// The import failed and the previous contents were restored.
    #[display("import failed; previous records were restored")]
    RolledBack,
    /// The import failed and so did restoring the previous contents.
    #[display("import failed and the previous records could not be restored")]
    RollbackFailed,
}

impl ErrorKind {
    /// Wrap a record store error, keeping the store's `Exn` frame as a child
    /// in the error tree.
    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Store(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(kind) => kind.is_retryable(),
            Self::Snapshot | Self::RolledBack => true,
            _ => false,
        }
    }

    /// Returns `true` if the store may have been left in an inconsistent
    /// state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed)
    }

    /// Returns `true` if the backup itself was rejected before anything was
    /// written.
    pub fn is_invalid_backup(&self) -> bool {
        matches!(
            self,
            Self::ParseError
                | Self::MalformedRoot(_)
                | Self::CorruptCollections(_)
                | Self::CountMismatch { .. }
                | Self::ChecksumMismatch
                | Self::MissingField { .. }
                | Self::InvalidField { .. }
        )
    }
}
