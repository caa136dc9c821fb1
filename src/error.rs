use derive_more::{Display, Error};
use libris_backup::error::{Error as BackupError, ErrorKind as BackupErrorKind};
use libris_config::error::{Error as ConfigError, ErrorKind as ConfigErrorKind};
use libris_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};
use std::path::PathBuf;
use std::process::ExitCode;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("{_0}")]
    Config(ConfigErrorKind),
    #[display("{_0}")]
    Store(StoreErrorKind),
    #[display("{_0}")]
    Backup(BackupErrorKind),
    #[display("could not access {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    #[display("{_0} not found: {_1}")]
    NotFound(#[error(not(source))] &'static str, #[error(not(source))] String),
}

impl ErrorKind {
    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Config(inner))
    }

    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Store(inner))
    }

    #[track_caller]
    pub fn backup(err: BackupError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Backup(inner))
    }

    /// Process exit code reporting this error.
    ///
    /// A failed rollback gets its own code: the database may need restoring
    /// by hand.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Backup(kind) if kind.is_fatal() => ExitCode::from(3),
            _ => ExitCode::FAILURE,
        }
    }
}
