mod book;
mod join;
mod loan;
mod student;

pub use self::book::BookRow;
pub(crate) use self::join::LoanDetailsRow;
pub use self::loan::LoanRow;
pub use self::student::StudentRow;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::{Date, UtcDateTime};

/// Calendar dates are stored as the UNIX timestamp of their UTC midnight.
pub(crate) fn date_to_row(date: Date) -> i64 {
    date.midnight().as_utc().unix_timestamp()
}

pub(crate) fn date_from_row(timestamp: i64, field: &'static str) -> Result<Date> {
    Ok(UtcDateTime::from_unix_timestamp(timestamp).or_raise(|| ErrorKind::InvalidData(field))?.date())
}

pub(crate) fn id_to_row(id: u64, field: &'static str) -> Result<i64> {
    i64::try_from(id).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn id_from_row(id: Option<i64>, field: &'static str) -> Result<u64> {
    match id {
        Some(id) => u64::try_from(id).or_raise(|| ErrorKind::InvalidData(field)),
        None => exn::bail!(ErrorKind::InvalidData(field)),
    }
}
