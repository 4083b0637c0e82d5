//! In-process list store.
//!
//! Backs the test suite and development mode so the router runs without an
//! external store. Every primitive mutates under one lock, which makes each
//! single-key operation atomic the same way the Redis commands are. The
//! availability toggle lets tests simulate a connectivity outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ListStore, Result, StoreError};

#[derive(Default)]
pub struct MemoryListStore {
    lists: Mutex<HashMap<String, Vec<String>>>,
    unavailable: AtomicBool,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (or back up). While unavailable every
    /// primitive, including ping, fails with a connection error.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Raw contents of a key, for assertions. Absent keys read as empty.
    pub fn contents(&self, key: &str) -> Vec<String> {
        self.lists.lock().get(key).cloned().unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Connection(
                "memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn len(&self, key: &str) -> Result<u64> {
        self.check_available()?;
        Ok(self.lists.lock().get(key).map_or(0, |l| l.len() as u64))
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.contents(key))
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<()> {
        self.check_available()?;
        if values.is_empty() {
            return Ok(());
        }
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .extend(values.iter().cloned());
        Ok(())
    }

    async fn remove_all(&self, key: &str, value: &str) -> Result<u64> {
        self.check_available()?;
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|v| v != value);
        let removed = (before - list.len()) as u64;
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.check_available()?;
        let mut lists = self.lists.lock();
        for key in keys {
            lists.remove(key);
        }
        Ok(())
    }

    async fn replace(&self, key: &str, values: &[String]) -> Result<()> {
        self.check_available()?;
        let mut lists = self.lists.lock();
        if values.is_empty() {
            lists.remove(key);
        } else {
            lists.insert(key.to_string(), values.to_vec());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
