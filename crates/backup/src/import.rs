//! Rollback-safe import of a backup file.
//!
//! ```text
//! Idle → Validating → SnapshottingCurrent → Replacing → Committed
//!            │                │                 │
//!            └────────────────┴──→ Aborted      ├──→ RolledBack
//!                                               └──→ Aborted (fatal)
//! ```
//!
//! The current contents are captured before anything is written. If the
//! replace fails they are written back with the same primitive; when that
//! fails as well the store may be inconsistent and the import reports
//! [`ErrorKind::RollbackFailed`].

use crate::error::{Error, ErrorKind, Result};
use crate::store::SnapshotStore;
use crate::validate::read_backup;
use derive_more::Display;
use libris_store::Snapshot;
use libris_store::error::Error as StoreError;
use tracing::{debug, error, instrument, warn};

/// Stage of an [`ImportPipeline`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    #[display("idle")]
    Idle,
    #[display("validating")]
    Validating,
    #[display("snapshotting current records")]
    SnapshottingCurrent,
    #[display("replacing")]
    Replacing,
    #[display("committed")]
    Committed,
    #[display("rolled back")]
    RolledBack,
    #[display("aborted")]
    Aborted,
}
impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Aborted)
    }
}

/// What a successful import brought in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub version: String,
    pub export_timestamp: String,
    pub books: usize,
    pub students: usize,
    pub loans: usize,
}
impl ImportSummary {
    pub fn record_count(&self) -> usize {
        self.books + self.students + self.loans
    }
}

/// Imports backups into a [`SnapshotStore`], tracking its [`ImportState`].
pub struct ImportPipeline<'a, S: SnapshotStore + ?Sized> {
    store: &'a S,
    state: ImportState,
}

impl<'a, S: SnapshotStore + ?Sized> ImportPipeline<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            state: ImportState::Idle,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    fn transition(&mut self, next: ImportState) {
        debug!(from = %self.state, to = %next, "import state");
        self.state = next;
    }

    /// Validate `input` and replace every record in the store with its
    /// contents.
    ///
    /// Running the pipeline again starts over from [`ImportState::Idle`].
    #[instrument(skip_all, fields(bytes = input.len()))]
    pub async fn run(&mut self, input: &str) -> Result<ImportSummary> {
        self.state = ImportState::Idle;
        self.transition(ImportState::Validating);
        let backup = match read_backup(input) {
            Ok(backup) => backup,
            Err(err) => {
                warn!(reason = %&*err, "backup rejected");
                self.transition(ImportState::Aborted);
                return Err(err);
            },
        };
        let summary = ImportSummary {
            version: backup.version.clone(),
            export_timestamp: backup.export_timestamp.clone(),
            books: backup.books.len(),
            students: backup.students.len(),
            loans: backup.loans.len(),
        };

        self.transition(ImportState::SnapshottingCurrent);
        let rollback_point = match self.store.export_all().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.transition(ImportState::Aborted);
                return Err(err.raise(ErrorKind::Snapshot));
            },
        };

        self.transition(ImportState::Replacing);
        let incoming = backup.into_snapshot();
        match self.store.replace_all(&incoming).await {
            Ok(()) => {
                self.transition(ImportState::Committed);
                Ok(summary)
            },
            Err(err) => Err(self.roll_back(err, &rollback_point).await),
        }
    }

    async fn roll_back(&mut self, cause: StoreError, rollback_point: &Snapshot) -> Error {
        warn!(reason = %&*cause, "replace failed, restoring previous records");
        match self.store.replace_all(rollback_point).await {
            Ok(()) => {
                self.transition(ImportState::RolledBack);
                cause.raise(ErrorKind::RolledBack)
            },
            Err(restore) => {
                error!(
                    reason = %&*cause,
                    restore = %&*restore,
                    records = rollback_point.record_count(),
                    "could not restore previous records; store may be inconsistent"
                );
                self.transition(ImportState::Aborted);
                restore.raise(ErrorKind::RollbackFailed)
            },
        }
    }
}
