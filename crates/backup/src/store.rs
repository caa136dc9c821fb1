//! The record store as seen by backups.

use crate::backup::Backup;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use libris_store::error::Result as StoreResult;
use libris_store::{Repository, Snapshot};
use tracing::instrument;

/// Whole-store export and replace.
///
/// Both operations are atomic: `export_all` reads a consistent snapshot and
/// `replace_all` either swaps in every record or leaves the store untouched.
/// [`Repository`] is the production implementation.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn export_all(&self) -> StoreResult<Snapshot>;

    async fn replace_all(&self, snapshot: &Snapshot) -> StoreResult<()>;
}

#[async_trait]
impl SnapshotStore for Repository {
    async fn export_all(&self) -> StoreResult<Snapshot> {
        Repository::export_all(self).await
    }

    async fn replace_all(&self, snapshot: &Snapshot) -> StoreResult<()> {
        Repository::replace_all(self, snapshot).await
    }
}

/// Take a backup of everything in `store`.
#[instrument(skip_all)]
pub async fn export_backup<S: SnapshotStore + ?Sized>(store: &S) -> Result<Backup> {
    let snapshot = store.export_all().await.map_err(ErrorKind::store)?;
    Backup::create(snapshot)
}
