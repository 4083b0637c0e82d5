//! List-backed router implementation.
//!
//! Routing state lives in list-valued keys:
//! - `frontend:<host>` — element 0 is the backend (or alias) name marker,
//!   the rest are route addresses in insertion order;
//! - `cname:<backend>` — the alias hostnames registered to `backend`.
//!
//! The canonical list for a backend and every one of its alias mirrors must
//! hold the same address set. Canonical and mirror writes are an ordered
//! sequence of independently atomic single-key commands, not a cross-key
//! transaction; a crash between steps can leave a mirror diverged, and the
//! next `set_cname` touching that alias repairs it with one atomic list
//! replace.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sy_common::RouteAddr;

use crate::conn::ConnectionCache;
use crate::error::{OpCause, Result, RouteOp, RouterError};
use crate::registry::{RouterContext, RouterFactory};
use crate::store::ListStore;
use crate::Router;

fn frontend_key(host: &str) -> String {
    format!("frontend:{host}")
}

fn cname_key(backend: &str) -> String {
    format!("cname:{backend}")
}

pub struct FrontendRouter {
    prefix: String,
    domain: Option<String>,
    connections: Arc<ConnectionCache>,
}

impl FrontendRouter {
    /// Canonical type name in the router registry.
    pub const TYPE: &'static str = "frontend";

    pub fn new(ctx: RouterContext) -> Self {
        Self {
            prefix: ctx.prefix,
            domain: ctx.settings.domain,
            connections: ctx.connections,
        }
    }

    /// Registry constructor for this implementation.
    pub fn factory() -> RouterFactory {
        Arc::new(|ctx| Arc::new(FrontendRouter::new(ctx)) as Arc<dyn Router>)
    }

    fn domain(&self, op: RouteOp) -> Result<&str> {
        self.domain
            .as_deref()
            .ok_or_else(|| RouterError::op(op, OpCause::DomainNotConfigured(self.prefix.clone())))
    }

    async fn store(&self, op: RouteOp) -> Result<Arc<dyn ListStore>> {
        self.connections
            .acquire(&self.prefix)
            .await
            .map_err(|e| RouterError::op(op, e))
    }

    /// Canonical hostname for a backend (`backend.domain`).
    fn backend_host(&self, backend: &str, op: RouteOp) -> Result<String> {
        Ok(format!("{}.{}", backend, self.domain(op)?))
    }

    /// Alias hostnames currently registered to `backend`. An unregistered
    /// backend yields an empty set, never an error.
    async fn cnames_of(
        &self,
        store: &Arc<dyn ListStore>,
        backend: &str,
        op: RouteOp,
    ) -> Result<Vec<String>> {
        store
            .range(&cname_key(backend))
            .await
            .map_err(|e| RouterError::op(op, e))
    }

    /// Idempotently remove one address from a list, returning the count
    /// actually removed. Absence is not an error.
    async fn remove_element(
        &self,
        store: &Arc<dyn ListStore>,
        key: &str,
        value: &str,
        op: RouteOp,
    ) -> Result<u64> {
        store
            .remove_all(key, value)
            .await
            .map_err(|e| RouterError::op(op, e))
    }

    /// Rewrite every mirror of `backend` with `marker` + `addrs`, one atomic
    /// replace per mirror key.
    async fn rewrite_mirrors(
        &self,
        store: &Arc<dyn ListStore>,
        backend: &str,
        marker: &str,
        addrs: &[String],
        op: RouteOp,
    ) -> Result<()> {
        let mut target = Vec::with_capacity(addrs.len() + 1);
        target.push(marker.to_string());
        target.extend_from_slice(addrs);
        for alias in self.cnames_of(store, backend, op).await? {
            store
                .replace(&frontend_key(&alias), &target)
                .await
                .map_err(|e| RouterError::op(op, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Router for FrontendRouter {
    async fn add_backend(&self, name: &str) -> Result<()> {
        let host = self.backend_host(name, RouteOp::Add)?;
        let store = self.store(RouteOp::Add).await?;
        let key = frontend_key(&host);
        let len = store
            .len(&key)
            .await
            .map_err(|e| RouterError::op(RouteOp::Add, e))?;
        if len == 0 {
            // Marker element: the backend's own name, always at position 0.
            store
                .push(&key, &[name.to_string()])
                .await
                .map_err(|e| RouterError::op(RouteOp::Add, e))?;
            info!(backend = name, host, "Created backend");
        } else {
            debug!(backend = name, "Backend already present, create is a no-op");
        }
        Ok(())
    }

    async fn remove_backend(&self, name: &str) -> Result<()> {
        let host = self.backend_host(name, RouteOp::Remove)?;
        let store = self.store(RouteOp::Remove).await?;
        let key = frontend_key(&host);
        let len = store
            .len(&key)
            .await
            .map_err(|e| RouterError::op(RouteOp::Remove, e))?;
        if len == 0 {
            return Err(RouterError::BackendNotFound);
        }

        let aliases = self.cnames_of(&store, name, RouteOp::Remove).await?;
        let mut doomed = Vec::with_capacity(aliases.len() + 2);
        doomed.push(key);
        doomed.extend(aliases.iter().map(|alias| frontend_key(alias)));
        doomed.push(cname_key(name));
        store
            .delete(&doomed)
            .await
            .map_err(|e| RouterError::op(RouteOp::Remove, e))?;
        info!(backend = name, mirrors = aliases.len(), "Removed backend");
        Ok(())
    }

    async fn add_route(&self, backend: &str, addr: &RouteAddr) -> Result<()> {
        let host = self.backend_host(backend, RouteOp::Add)?;
        // Existence and duplicate checks go through the routes read, so
        // connectivity failures here carry the "routes" label.
        let current = self.routes(backend).await?;
        if current.contains(addr) {
            return Err(RouterError::RouteExists);
        }

        let store = self.store(RouteOp::Add).await?;
        let value = [addr.to_string()];
        store
            .push(&frontend_key(&host), &value)
            .await
            .map_err(|e| RouterError::op(RouteOp::Add, e))?;

        // Mirrors follow immediately; a crash between these steps leaves a
        // diverged mirror for set_cname to repair.
        for alias in self.cnames_of(&store, backend, RouteOp::Add).await? {
            store
                .push(&frontend_key(&alias), &value)
                .await
                .map_err(|e| RouterError::op(RouteOp::Add, e))?;
        }
        debug!(backend, addr = %addr, "Added route");
        Ok(())
    }

    async fn remove_route(&self, backend: &str, addr: &RouteAddr) -> Result<()> {
        let host = self.backend_host(backend, RouteOp::Remove)?;
        let store = self.store(RouteOp::Remove).await?;
        let value = addr.to_string();
        let removed = self
            .remove_element(&store, &frontend_key(&host), &value, RouteOp::Remove)
            .await?;
        for alias in self.cnames_of(&store, backend, RouteOp::Remove).await? {
            self.remove_element(&store, &frontend_key(&alias), &value, RouteOp::Remove)
                .await?;
        }
        debug!(backend, addr = %addr, removed, "Removed route");
        Ok(())
    }

    async fn set_cname(&self, alias: &str, backend: &str) -> Result<()> {
        let host = self.backend_host(backend, RouteOp::SetCname)?;
        let store = self.store(RouteOp::SetCname).await?;
        let canonical = store
            .range(&frontend_key(&host))
            .await
            .map_err(|e| RouterError::op(RouteOp::SetCname, e))?;
        if canonical.is_empty() {
            return Err(RouterError::BackendNotFound);
        }

        // Invariant: the alias set holds exactly the hostnames whose mirror
        // exists. Re-registering after an out-of-band mirror delete must not
        // duplicate the set entry.
        let aliases = self.cnames_of(&store, backend, RouteOp::SetCname).await?;
        if !aliases.iter().any(|a| a == alias) {
            store
                .push(&cname_key(backend), &[alias.to_string()])
                .await
                .map_err(|e| RouterError::op(RouteOp::SetCname, e))?;
        }

        let mirror_key = frontend_key(alias);
        let mirror = store
            .range(&mirror_key)
            .await
            .map_err(|e| RouterError::op(RouteOp::SetCname, e))?;
        if mirror.is_empty() {
            store
                .push(&mirror_key, &canonical)
                .await
                .map_err(|e| RouterError::op(RouteOp::SetCname, e))?;
            info!(alias, backend, "Registered cname mirror");
            return Ok(());
        }

        if mirror != canonical {
            // Silent self-healing: the caller still sees CNameExists, only
            // the list contents become correct again.
            warn!(alias, backend, "Mirror diverged from canonical list, repairing");
            store
                .replace(&mirror_key, &canonical)
                .await
                .map_err(|e| RouterError::op(RouteOp::SetCname, e))?;
        }
        Err(RouterError::CNameExists)
    }

    async fn unset_cname(&self, alias: &str, backend: &str) -> Result<()> {
        let store = self.store(RouteOp::UnsetCname).await?;
        store
            .remove_all(&cname_key(backend), alias)
            .await
            .map_err(|e| RouterError::op(RouteOp::UnsetCname, e))?;
        store
            .delete(&[frontend_key(alias)])
            .await
            .map_err(|e| RouterError::op(RouteOp::UnsetCname, e))?;
        info!(alias, backend, "Unregistered cname");
        Ok(())
    }

    async fn addr(&self, backend: &str) -> Result<String> {
        let host = self.backend_host(backend, RouteOp::Get)?;
        let store = self.store(RouteOp::Get).await?;
        let len = store
            .len(&frontend_key(&host))
            .await
            .map_err(|e| RouterError::op(RouteOp::Get, e))?;
        if len == 0 {
            return Err(RouterError::BackendNotFound);
        }
        Ok(host)
    }

    async fn routes(&self, backend: &str) -> Result<Vec<RouteAddr>> {
        let host = self.backend_host(backend, RouteOp::Routes)?;
        let store = self.store(RouteOp::Routes).await?;
        let list = store
            .range(&frontend_key(&host))
            .await
            .map_err(|e| RouterError::op(RouteOp::Routes, e))?;
        if list.is_empty() {
            return Err(RouterError::BackendNotFound);
        }
        // Element 0 is the name marker; unparseable entries are skipped so
        // one corrupted element cannot hide the rest of the route set.
        let routes = list[1..]
            .iter()
            .filter_map(|raw| match raw.parse::<RouteAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    debug!(backend, error = %e, "Skipping unparseable route entry");
                    None
                }
            })
            .collect();
        Ok(routes)
    }

    async fn swap(&self, backend1: &str, backend2: &str, cname_only: bool) -> Result<()> {
        let host1 = self.backend_host(backend1, RouteOp::Swap)?;
        let host2 = self.backend_host(backend2, RouteOp::Swap)?;
        let store = self.store(RouteOp::Swap).await?;

        let key1 = frontend_key(&host1);
        let key2 = frontend_key(&host2);
        let list1 = store
            .range(&key1)
            .await
            .map_err(|e| RouterError::op(RouteOp::Swap, e))?;
        let list2 = store
            .range(&key2)
            .await
            .map_err(|e| RouterError::op(RouteOp::Swap, e))?;
        if list1.is_empty() || list2.is_empty() {
            return Err(RouterError::BackendNotFound);
        }

        // Target lists keep each key's own marker and take the other
        // backend's addresses. Each key is rewritten with a single atomic
        // replace, so readers never observe an empty or mixed list.
        let marker1 = list1[0].clone();
        let addrs1 = list1[1..].to_vec();
        let marker2 = list2[0].clone();
        let addrs2 = list2[1..].to_vec();

        if !cname_only {
            let mut target1 = vec![marker1.clone()];
            target1.extend_from_slice(&addrs2);
            let mut target2 = vec![marker2.clone()];
            target2.extend_from_slice(&addrs1);
            store
                .replace(&key1, &target1)
                .await
                .map_err(|e| RouterError::op(RouteOp::Swap, e))?;
            store
                .replace(&key2, &target2)
                .await
                .map_err(|e| RouterError::op(RouteOp::Swap, e))?;
        }

        // Mirrors take the exchanged address sets in both modes; in
        // cname-only mode they are the entire swap target.
        self.rewrite_mirrors(&store, backend1, &marker1, &addrs2, RouteOp::Swap)
            .await?;
        self.rewrite_mirrors(&store, backend2, &marker2, &addrs1, RouteOp::Swap)
            .await?;

        info!(backend1, backend2, cname_only, "Swapped route sets");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let store = self.store(RouteOp::HealthCheck).await?;
        store
            .ping()
            .await
            .map_err(|e| RouterError::op(RouteOp::HealthCheck, e))
    }
}
