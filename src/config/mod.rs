//! Configuration management for atlantis-drift
//!
//! The file layer sits under flags and environment variables; see
//! `cli::commands::run::merge` for the overlay.

pub mod schema;

pub use schema::Config;

use crate::error::{DriftError, DriftResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const APP_DIR: &str = "atlantis-drift";

/// Locates and reads the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Read from `path` instead of the default location (`--config`)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config dir>/atlantis-drift/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Default home of durable cache tables, `<state dir>/atlantis-drift/cache`
    pub fn cache_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("cache")
    }

    /// Load the file layer
    ///
    /// A missing file yields defaults so flags and environment alone can
    /// drive a run. Relative paths in the file are taken from the file's
    /// directory, not from wherever the binary happens to be started.
    pub async fn load(&self) -> DriftResult<Config> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", self.config_path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(DriftError::io(
                    format!("reading config from {}", self.config_path.display()),
                    e,
                ))
            }
        };

        let config: Config = toml::from_str(&content).map_err(|e| DriftError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from {}", self.config_path.display());
        Ok(config.normalized(self.config_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
