//! Opening the library database.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool size for file databases. One person at a desk: a single writer and
/// the odd concurrent read.
const DEFAULT_CONNECTIONS: u32 = 4;

/// Where the records live.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    /// Private to a single connection; gone once it closes.
    Memory,
}
impl Location {
    fn options(&self) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_millis(1500))
            .auto_vacuum(SqliteAutoVacuum::None)
            // Connect options pragmas are sent on every new pool connection.
            .pragma("wal_autocheckpoint", "800")
            .pragma("cache_size", "-4096")
            .pragma("temp_store", "memory");
        match self {
            Self::File(path) => options.filename(path).create_if_missing(true),
            Self::Memory => options.filename(":memory:"),
        }
    }

    fn max_connections(&self, requested: Option<u32>) -> u32 {
        match self {
            // Every connection to ":memory:" opens its own, empty database.
            Self::Memory => 1,
            Self::File(_) => requested.unwrap_or(DEFAULT_CONNECTIONS).max(1),
        }
    }
}

/// Handle to the library database.
///
/// Constructed once by the application root and lent to whatever needs it;
/// a [`Repository`](crate::Repository) is derived from it with
/// `Repository::from(&db)`. Opening is idempotent: the schema is migrated on
/// every open and already applied migrations are skipped.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    #[instrument(skip(max_connections))]
    async fn open(location: Location, max_connections: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(location.max_connections(max_connections))
            .connect_with(location.options())
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        debug!("database ready");
        Ok(db)
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_max(path, None).await
    }

    /// Like [`connect`](Self::connect), with an explicit pool size.
    pub async fn connect_with_max(path: impl AsRef<Path>, max_connections: Option<u32>) -> Result<Self> {
        Self::open(Location::File(path.as_ref().to_path_buf()), max_connections).await
    }

    /// A fresh, empty in-memory database.
    ///
    /// Available outside of `cfg(test)` so dependent crates can test against
    /// it. The pool holds a single connection.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(Location::Memory, None).await
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection once it's returned to the pool.
    pub async fn close(&self) {
        // Planner statistics; failure here changes nothing.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
