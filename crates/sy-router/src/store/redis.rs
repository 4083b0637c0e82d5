//! Redis-backed list store.
//!
//! One [`ConnectionManager`] per handle, cloned per operation; the manager
//! multiplexes and reconnects underneath. List replacement runs DEL + RPUSH
//! inside a MULTI/EXEC pipeline so the key is rewritten atomically.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use sy_config::StoreSettings;

use super::{ListStore, Result, StoreError};

pub struct RedisListStore {
    conn: ConnectionManager,
}

impl RedisListStore {
    /// Connect to the store described by `settings`.
    ///
    /// Fails up front when the server is unreachable; the router's
    /// connection cache turns that into a retriable tagged error.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let url = match &settings.password {
            Some(password) => {
                format!("redis://:{}@{}/{}", password, settings.server, settings.db)
            }
            None => format!("redis://{}/{}", settings.server, settings.db),
        };
        let client = redis::Client::open(url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, values).await?;
        Ok(())
    }

    async fn remove_all(&self, key: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        // LREM with count 0 removes every occurrence.
        let removed: u64 = conn.lrem(key, 0, value).await?;
        Ok(removed)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(keys).await?;
        Ok(())
    }

    async fn replace(&self, key: &str, values: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !values.is_empty() {
            pipe.rpush(key, values).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
