//! Switchyard configuration system.
//!
//! TOML-based configuration with environment variable overrides. Router
//! instances are configured under `[routers.<name>]`; anything an instance
//! does not set falls back to the workspace-level `[store]` settings and
//! `domain`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default store settings, used by any router instance that does not
    /// configure its own.
    pub store: StoreSettings,

    /// Default domain suffix for canonical hostnames (`backend.domain`).
    pub domain: Option<String>,

    /// Per-instance router configuration, keyed by instance name.
    pub routers: HashMap<String, RouterSettings>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the effective settings for a router instance.
    ///
    /// Instance-scoped values win over the workspace defaults. An instance
    /// that never appears in the file still resolves, entirely from defaults.
    pub fn router(&self, name: &str) -> ResolvedRouterSettings {
        let instance = self.routers.get(name);
        ResolvedRouterSettings {
            router_type: instance.and_then(|i| i.router_type.clone()),
            store: StoreSettings {
                server: instance
                    .and_then(|i| i.server.clone())
                    .unwrap_or_else(|| self.store.server.clone()),
                password: instance
                    .and_then(|i| i.password.clone())
                    .or_else(|| self.store.password.clone()),
                db: instance.and_then(|i| i.db).unwrap_or(self.store.db),
            },
            domain: instance
                .and_then(|i| i.domain.clone())
                .or_else(|| self.domain.clone()),
        }
    }
}

/// Connection settings for the list-oriented key/value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store server address (`host:port`).
    pub server: String,
    /// Optional access credential.
    pub password: Option<String>,
    /// Store database index.
    pub db: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
        }
    }
}

/// Raw per-instance router configuration as it appears in the file.
///
/// All fields are optional; unresolved fields fall back to the workspace
/// defaults via [`AppConfig::router`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Implementation type. Defaults to the instance name itself, so a
    /// plainly-named instance picks the implementation registered under
    /// its own name.
    #[serde(rename = "type")]
    pub router_type: Option<String>,
    pub server: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub domain: Option<String>,
}

/// Effective settings for one router instance after defaulting.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRouterSettings {
    pub router_type: Option<String>,
    pub store: StoreSettings,
    pub domain: Option<String>,
}
