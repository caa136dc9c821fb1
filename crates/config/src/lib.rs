//! Configuration for libris.
//!
//! Settings are merged from, in increasing order of precedence:
//!
//! 1. built-in defaults
//! 2. `libris.toml`, `libris.yaml` and `libris.json` in the platform config
//!    directory (e.g. `~/.config/libris` on Linux)
//! 3. a file passed explicitly (`--config`)
//! 4. `LIBRIS_*` environment variables, with `__` separating nested keys
//!    (`LIBRIS_LOANS__PERIOD_DAYS=21`)

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APPLICATION: &str = "libris";
const ENV_PREFIX: &str = "LIBRIS_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file, created on first use.
    pub path: PathBuf,
    /// Connection pool size; the store's default when unset.
    pub max_connections: Option<u32>,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = match project_dirs() {
            Some(dirs) => dirs.data_dir().join("libris.sqlite3"),
            None => PathBuf::from("libris.sqlite3"),
        };
        Self {
            path,
            max_connections: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanConfig {
    /// Days between checkout and the due date.
    pub period_days: u16,
}
impl Default for LoanConfig {
    fn default() -> Self {
        Self { period_days: 14 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Where exports are written when no output file is given.
    pub directory: PathBuf,
    /// Indent exported JSON.
    pub pretty: bool,
}
impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            pretty: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub loans: LoanConfig,
    pub backup: BackupConfig,
}

impl Config {
    /// Load from every standard source plus an optional explicit file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut loader = Loader::default();
        if let Some(file) = file {
            loader = loader.file(file);
        }
        loader.load()
    }

    /// Reject settings that would break the application at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.loans.period_days == 0 {
            exn::bail!(ErrorKind::Invalid("loans.period_days must be greater than zero"));
        }
        if self.database.max_connections == Some(0) {
            exn::bail!(ErrorKind::Invalid("database.max_connections must be greater than zero"));
        }
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.path must not be empty"));
        }
        Ok(())
    }

    /// Default location of a timestamped export.
    pub fn backup_path(&self, stamp: &str) -> PathBuf {
        self.backup.directory.join(format!("libris-backup-{stamp}.json"))
    }
}

/// Builder selecting which configuration sources are merged.
#[derive(Debug, Clone)]
pub struct Loader {
    config_dir: Option<PathBuf>,
    file: Option<PathBuf>,
    env_prefix: Option<String>,
}
impl Default for Loader {
    fn default() -> Self {
        Self {
            config_dir: project_dirs().map(|dirs| dirs.config_dir().to_path_buf()),
            file: None,
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }
}
impl Loader {
    /// A loader with only the built-in defaults.
    pub fn empty() -> Self {
        Self {
            config_dir: None,
            file: None,
            env_prefix: None,
        }
    }

    /// Directory searched for `libris.{toml,yaml,json}`.
    pub fn config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config_dir = dir;
        self
    }

    /// An explicit file, which must exist. The format follows the extension.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Prefix of environment variable overrides, or `None` to ignore the
    /// environment.
    pub fn env_prefix(mut self, prefix: Option<&str>) -> Self {
        self.env_prefix = prefix.map(str::to_string);
        self
    }

    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = &self.config_dir {
            debug!(dir = %dir.display(), "searching for configuration files");
            figment = figment
                .merge(Toml::file(dir.join("libris.toml")))
                .merge(Yaml::file(dir.join("libris.yaml")))
                .merge(Json::file(dir.join("libris.json")));
        }
        if let Some(file) = &self.file {
            if !file.is_file() {
                exn::bail!(ErrorKind::NotFound(file.clone()));
            }
            let extension = file.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
            figment = match extension.to_ascii_lowercase().as_str() {
                "toml" => figment.merge(Toml::file(file)),
                "yaml" | "yml" => figment.merge(Yaml::file(file)),
                "json" => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.display().to_string())),
            };
        }
        if let Some(prefix) = &self.env_prefix {
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }
        Ok(figment)
    }

    /// Merge the sources, then [validate](Config::validate) the result.
    pub fn load(&self) -> Result<Config> {
        let config: Config = self.figment()?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        debug!(database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }
}
