//! Router registry.
//!
//! Implementation types are registered under string keys (a plugin
//! registry); an instance name resolves to a type via instance-scoped
//! configuration (`routers.<name>.type`), defaulting to the instance name
//! itself. Constructed routers are cached per instance, so several
//! independently configured instances of one implementation coexist,
//! distinguished only by their configuration prefix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use sy_config::{AppConfig, ResolvedRouterSettings};

use crate::conn::ConnectionCache;
use crate::error::{Result, RouterError};
use crate::frontend::FrontendRouter;
use crate::Router;

/// Everything a router constructor receives: its configuration prefix, the
/// resolved instance settings, and the shared connection cache.
pub struct RouterContext {
    pub prefix: String,
    pub settings: ResolvedRouterSettings,
    pub connections: Arc<ConnectionCache>,
}

pub type RouterFactory = Arc<dyn Fn(RouterContext) -> Arc<dyn Router> + Send + Sync>;

pub struct RouterRegistry {
    config: Arc<AppConfig>,
    connections: Arc<ConnectionCache>,
    factories: RwLock<HashMap<String, RouterFactory>>,
    instances: Mutex<HashMap<String, Arc<dyn Router>>>,
}

impl RouterRegistry {
    /// Empty registry; callers register implementation types explicitly.
    pub fn new(config: Arc<AppConfig>, connections: Arc<ConnectionCache>) -> Self {
        Self {
            config,
            connections,
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the built-in list-backed implementation registered
    /// under its canonical type name.
    pub fn with_builtin(config: Arc<AppConfig>, connections: Arc<ConnectionCache>) -> Self {
        let registry = Self::new(config, connections);
        registry.register(FrontendRouter::TYPE, FrontendRouter::factory());
        registry
    }

    /// Register `factory` under `type_name`. One implementation may be
    /// registered under several names; later registrations win.
    pub fn register(&self, type_name: &str, factory: RouterFactory) {
        self.factories
            .write()
            .insert(type_name.to_string(), factory);
    }

    /// Resolve the router instance `name`, constructing and caching it on
    /// first use.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Router>> {
        let mut instances = self.instances.lock().await;
        if let Some(router) = instances.get(name) {
            return Ok(router.clone());
        }

        let settings = self.config.router(name);
        let type_name = settings
            .router_type
            .clone()
            .unwrap_or_else(|| name.to_string());
        let factory = self
            .factories
            .read()
            .get(&type_name)
            .cloned()
            .ok_or_else(|| RouterError::UnknownType(type_name.clone()))?;

        debug!(instance = name, r#type = %type_name, "Constructing router instance");
        let router = factory(RouterContext {
            prefix: name.to_string(),
            settings,
            connections: self.connections.clone(),
        });
        instances.insert(name.to_string(), router.clone());
        Ok(router)
    }
}
