//! Session configuration.
//!
//! Read from TOML. Every field has a default, so an empty or missing file is
//! a valid configuration.
//!
//! ```toml
//! reconnect_timeout_secs = 10
//! snapshot_name = "User"
//! cleared_snapshot_name = "Cleared Data"
//! command_buffer = 64
//! event_buffer = 64
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable overriding `reconnect_timeout_secs`.
pub const RECONNECT_TIMEOUT_ENV: &str = "SLIMTUNE_RECONNECT_TIMEOUT";

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds to wait for a reconnect before reporting failure.
    pub reconnect_timeout_secs: u64,
    /// Name given to snapshots taken by the user.
    pub snapshot_name: String,
    /// Name given to the snapshot saved before clearing live data.
    pub cleared_snapshot_name: String,
    /// Capacity of the session command channel.
    pub command_buffer: usize,
    /// Capacity of the presentation event channel.
    pub event_buffer: usize,
    /// Default log level for the binary.
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout_secs: 10,
            snapshot_name: "User".to_string(),
            cleared_snapshot_name: "Cleared Data".to_string(),
            command_buffer: 64,
            event_buffer: 64,
            log_level: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Default config file location: `<config dir>/slimtune/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("slimtune").join("config.toml"))
    }

    /// Parses a TOML document.
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents, path)?;
        debug!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Loads from an explicit path, else the default path if it exists,
    /// else defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(std::env::var(RECONNECT_TIMEOUT_ENV).ok().as_deref());
        Ok(config)
    }

    /// Applies the reconnect timeout override, ignoring unparsable values.
    pub fn apply_env(&mut self, reconnect_timeout: Option<&str>) {
        if let Some(raw) = reconnect_timeout {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.reconnect_timeout_secs = secs,
                Err(_) => warn!(
                    value = raw,
                    "Ignoring invalid {RECONNECT_TIMEOUT_ENV}"
                ),
            }
        }
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }
}
