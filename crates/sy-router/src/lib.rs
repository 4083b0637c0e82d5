//! Switchyard Routing Core
//!
//! The control-plane routing table for a multi-tenant application platform:
//! - Router: the operation surface consumed by provisioning/orchestration
//! - FrontendRouter: list-backed implementation over `frontend:`/`cname:` keys
//! - ConnectionCache: per-prefix shared store handles with eviction on failure
//! - RouterRegistry: string-keyed implementation factories and instance cache
//! - ListStore: atomic single-key list primitives (Redis and in-memory backends)
//! - RouterError: the BackendNotFound / CNameExists / tagged-operation taxonomy
//!
//! The proxy data plane that forwards traffic reads these tables; it is not
//! implemented here.

use async_trait::async_trait;

use sy_common::RouteAddr;

pub mod conn;
pub mod error;
pub mod frontend;
pub mod registry;
pub mod store;

pub use conn::{ConnectionCache, RedisStoreFactory, StoreFactory};
pub use error::{OpCause, Result, RouteOp, RouterError};
pub use frontend::FrontendRouter;
pub use registry::{RouterContext, RouterFactory, RouterRegistry};
pub use store::{ListStore, MemoryListStore, RedisListStore, StoreError};

/// The routing-table operations consumed by the orchestration collaborator.
///
/// Implementations keep a backend's canonical route list and every alias
/// mirror holding the same address set whenever the system is consistent;
/// divergence caused by a partial multi-key write is repaired lazily on the
/// next `set_cname` touching the affected alias.
#[async_trait]
pub trait Router: Send + Sync {
    /// Create the backend's canonical list with its marker element.
    /// Idempotent: a second create is a no-op.
    async fn add_backend(&self, name: &str) -> Result<()>;

    /// Delete the backend's canonical list, every alias mirror, and the
    /// alias set. Fails with [`RouterError::BackendNotFound`] when no
    /// canonical list exists.
    async fn remove_backend(&self, name: &str) -> Result<()>;

    /// Append an address to the canonical list and to every mirror.
    async fn add_route(&self, backend: &str, addr: &RouteAddr) -> Result<()>;

    /// Remove an address from the canonical list and every mirror.
    /// Removing an absent address is a no-op.
    async fn remove_route(&self, backend: &str, addr: &RouteAddr) -> Result<()>;

    /// Register an alias for a backend, cloning the canonical list onto the
    /// alias mirror. Once registered, every further call reports
    /// [`RouterError::CNameExists`], repairing the mirror first if it
    /// diverged.
    async fn set_cname(&self, alias: &str, backend: &str) -> Result<()>;

    /// Drop an alias and its mirror. Unregistered aliases are a no-op.
    async fn unset_cname(&self, alias: &str, backend: &str) -> Result<()>;

    /// Canonical hostname (`backend.domain`) for the backend.
    async fn addr(&self, backend: &str) -> Result<String>;

    /// Live route addresses (marker excluded); unparseable entries are
    /// skipped.
    async fn routes(&self, backend: &str) -> Result<Vec<RouteAddr>>;

    /// Exchange two backends' live route sets with one atomic list replace
    /// per key. With `cname_only`, only the alias mirrors are exchanged.
    async fn swap(&self, backend1: &str, backend2: &str, cname_only: bool) -> Result<()>;

    /// Liveness probe against the cached store connection.
    async fn health_check(&self) -> Result<()>;
}
