//! Store configuration.
//!
//! Read from the `[store]` section of a TOML file:
//!
//! ```toml
//! [store]
//! backend = "relational"
//! path = "data/rollcall.db"
//! busy_timeout_ms = 5000
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Which storage engine backs the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single redb file.
    #[default]
    Embedded,
    /// SQLite database.
    Relational,
}

/// Settings loaded from the `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Database file; parent directories are created on open.
    pub path: PathBuf,
    /// How long a relational writer waits for the write lock.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Embedded,
            path: PathBuf::from("data/rollcall.redb"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    store: StoreConfig,
}

impl StoreConfig {
    /// Parse the `[store]` section out of a TOML document.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| StoreError::Config(format!("failed to parse TOML config: {e}")))?;
        Ok(file.store)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using store defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StoreError::Config(format!("cannot read {}: {e}", path.display())));
            }
        };

        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), backend = ?config.backend, "store configuration loaded");
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ── tests ────────────────────────────────────────────────────────────
