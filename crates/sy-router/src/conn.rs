//! Per-prefix connection cache.
//!
//! One shared store handle per configuration prefix, owned by the
//! composition root rather than a process-global. The map is guarded by a
//! single async mutex held across handle construction, so concurrent first
//! callers for a prefix never build duplicate handles. Liveness probes run
//! outside the lock: a stalled store on one prefix must not block
//! acquisitions on any other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use sy_config::{AppConfig, StoreSettings};

use crate::store::{ListStore, RedisListStore, StoreError};

/// Builds store handles from prefix-scoped settings.
///
/// Production wires [`RedisStoreFactory`]; tests inject factories that hand
/// out in-memory stores.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn connect(
        &self,
        prefix: &str,
        settings: &StoreSettings,
    ) -> Result<Arc<dyn ListStore>, StoreError>;
}

pub struct RedisStoreFactory;

#[async_trait]
impl StoreFactory for RedisStoreFactory {
    async fn connect(
        &self,
        prefix: &str,
        settings: &StoreSettings,
    ) -> Result<Arc<dyn ListStore>, StoreError> {
        debug!(prefix, server = %settings.server, db = settings.db, "Connecting store handle");
        let store = RedisListStore::connect(settings).await?;
        Ok(Arc::new(store))
    }
}

pub struct ConnectionCache {
    config: Arc<AppConfig>,
    factory: Arc<dyn StoreFactory>,
    handles: Mutex<HashMap<String, Arc<dyn ListStore>>>,
}

impl ConnectionCache {
    pub fn new(config: Arc<AppConfig>, factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            config,
            factory,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Cache backed by the Redis factory.
    pub fn with_redis(config: Arc<AppConfig>) -> Self {
        Self::new(config, Arc::new(RedisStoreFactory))
    }

    /// Resolve the shared handle for `prefix`, constructing it on first use.
    ///
    /// A cached handle is probed before reuse; when the probe fails the
    /// handle is evicted and reconnection is attempted in place. A failed
    /// reconnection leaves no entry behind, so a later call retries, and
    /// never touches other prefixes.
    pub async fn acquire(&self, prefix: &str) -> Result<Arc<dyn ListStore>, StoreError> {
        // Clone the handle out and probe without the lock, so a slow or
        // hung store on this prefix never stalls other prefixes.
        let cached = self.handles.lock().await.get(prefix).cloned();
        if let Some(handle) = cached {
            match handle.ping().await {
                Ok(()) => return Ok(handle),
                Err(e) => {
                    warn!(prefix, error = %e, "Cached store handle failed liveness probe, evicting");
                    let mut handles = self.handles.lock().await;
                    // Evict only the handle that failed; a replacement
                    // installed while we were probing stays.
                    if handles
                        .get(prefix)
                        .is_some_and(|h| Arc::ptr_eq(h, &handle))
                    {
                        handles.remove(prefix);
                    }
                }
            }
        }
        self.connect_and_cache(prefix).await
    }

    /// Build and cache the handle for `prefix`. Holds the map lock across
    /// construction so concurrent first callers share one connect attempt;
    /// a handle installed in the meantime is returned as-is.
    async fn connect_and_cache(&self, prefix: &str) -> Result<Arc<dyn ListStore>, StoreError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(prefix) {
            return Ok(handle.clone());
        }
        let settings = self.config.router(prefix).store;
        let handle = self.factory.connect(prefix, &settings).await?;
        handles.insert(prefix.to_string(), handle.clone());
        Ok(handle)
    }

    /// Drop the cached handle for `prefix`, if any. The next acquisition
    /// reconnects.
    pub async fn invalidate(&self, prefix: &str) {
        self.handles.lock().await.remove(prefix);
    }
}
