//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use exn::Exn;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Business Rules
/// Always raised from an aborted transaction, nothing was written.
/// - [`ErrorKind::ConstraintViolation`]
/// - [`ErrorKind::Unavailable`]
/// - [`ErrorKind::InvalidLoanState`]
/// - [`ErrorKind::InvalidRecord`]
/// - [`ErrorKind::NotFound`]
///
/// ### Storage Faults
/// - [`ErrorKind::Database`]
/// - [`ErrorKind::Migration`]
/// - [`ErrorKind::InvalidData`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying grouped write (or read) failed.
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A unique index would collide with a different record.
    #[display("unique constraint violated: {_0}")]
    ConstraintViolation(#[error(not(source))] &'static str),
    /// Checkout of a book that is missing or has no copies left.
    #[display("book {_0} has no available copies")]
    Unavailable(#[error(not(source))] u64),
    /// Return of a loan that is missing or already returned.
    #[display("loan {_0} is not an active loan")]
    InvalidLoanState(#[error(not(source))] u64),
    /// A record was rejected before (or by) a `CHECK` constraint.
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] &'static str),
    #[display("{_0} not found: {_1}")]
    NotFound(#[error(not(source))] &'static str, #[error(not(source))] u64),
    /// A stored row could not be converted into its domain type.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY and friends surface as a generic database error.
        matches!(self, Self::Database)
    }

    /// Classify a failed write, keeping the driver error in the error tree.
    ///
    /// Unique index collisions become [`ErrorKind::ConstraintViolation`]
    /// naming `unique`, and `CHECK` failures become
    /// [`ErrorKind::InvalidRecord`] naming `record`. Anything else is a
    /// storage fault.
    #[track_caller]
    pub(crate) fn write(err: sqlx::Error, unique: &'static str, record: &'static str) -> Error {
        let kind = match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Self::ConstraintViolation(unique),
                sqlx::error::ErrorKind::CheckViolation | sqlx::error::ErrorKind::NotNullViolation => {
                    Self::InvalidRecord(record)
                },
                _ => Self::Database,
            },
            _ => Self::Database,
        };
        Exn::new(err).raise(kind)
    }
}
