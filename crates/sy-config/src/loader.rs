//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "switchyard.toml",
    "./config/config.toml",
    "/etc/switchyard/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("SWITCHYARD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides to the workspace-level defaults.
    ///
    /// Instance-scoped values from the file still win over these; the
    /// overrides only move the fallback.
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("SWITCHYARD_STORE_SERVER") {
            config.store.server = val;
        }
        if let Ok(val) = env::var("SWITCHYARD_STORE_PASSWORD") {
            config.store.password = Some(val);
        }
        if let Ok(val) = env::var("SWITCHYARD_STORE_DB") {
            if let Ok(db) = val.parse() {
                config.store.db = db;
            }
        }
        if let Ok(val) = env::var("SWITCHYARD_DOMAIN") {
            config.domain = Some(val);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
