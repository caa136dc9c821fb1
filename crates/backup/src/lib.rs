//! Backup export, validation and rollback-safe import for libris.
//!
//! A backup is a JSON document holding every record of the store together
//! with a record count and a content [fingerprint](checksum::compute_fingerprint).
//! Exports are built with [`Backup::create`] (or [`export_backup`]); imports go
//! through [`validate_backup`] and then an [`ImportPipeline`], which keeps a
//! copy of the current records and writes it back if the import fails.
//!
//! ```no_run
//! # use libris_backup::{ImportPipeline, export_backup};
//! # use libris_store::{Database, Repository};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("library.sqlite3").await?;
//! let repo = Repository::from(&db);
//!
//! let json = export_backup(&repo).await?.to_json(true)?;
//! let summary = ImportPipeline::new(&repo).run(&json).await?;
//! assert_eq!(summary.books, repo.get_all::<libris_store::Book>().await?.len());
//! # Ok(())
//! # }
//! ```

mod backup;
pub mod checksum;
pub mod error;
mod import;
mod store;
mod validate;

pub use crate::backup::{Backup, FORMAT_VERSION};
pub use crate::checksum::compute_fingerprint;
pub use crate::import::{ImportPipeline, ImportState, ImportSummary};
pub use crate::store::{SnapshotStore, export_backup};
pub use crate::validate::{parse_backup, read_backup, required_fields, validate_backup};
