//! List-oriented key/value store abstraction.
//!
//! The routing table lives entirely in list-valued keys; every mutation the
//! router performs maps onto one of the primitives below, and each primitive
//! is atomic at the store level for its single key. Cross-key consistency is
//! the caller's concern (see the CNAME repair path in the frontend router).

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryListStore;
pub use redis::RedisListStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store command error: {0}")]
    Command(#[from] ::redis::RedisError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Atomic single-key list primitives against the external store.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Number of elements under `key` (0 when the key is absent).
    async fn len(&self, key: &str) -> Result<u64>;

    /// Full contents of the list under `key`, in order.
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    /// Append `values` to the list under `key`, creating it if absent.
    async fn push(&self, key: &str, values: &[String]) -> Result<()>;

    /// Remove every occurrence of `value` from the list under `key`,
    /// returning the count actually removed. Absence is not an error.
    async fn remove_all(&self, key: &str, value: &str) -> Result<u64>;

    /// Delete the given keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Atomically replace the whole list under `key` with `values`.
    ///
    /// Readers observe either the old list or the new one, never an empty
    /// or partially-written intermediate state.
    async fn replace(&self, key: &str, values: &[String]) -> Result<()>;

    /// Lightweight liveness probe. Does not mutate state.
    async fn ping(&self) -> Result<()>;
}
