//! Per-named-action bounded-concurrency gate.
//!
//! Orchestration callers wrap expensive operations (deploys, unit starts,
//! image pulls) in a limiter acquisition so that at most `limit` of each
//! named action run at once. The router itself never calls into this crate;
//! it is an independent utility consumed around router operations.
//!
//! Semantics:
//! - semaphores are created lazily, one per action name, at the configured
//!   capacity;
//! - a limit of 0 disables gating entirely and acquisition is an immediate
//!   no-op;
//! - changing the limit drops every per-action semaphore, so holders that
//!   acquired under the old limit are not retroactively constrained.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Slot held while a gated action runs. Releasing is dropping the guard.
#[derive(Debug)]
pub struct ActionGuard {
    permit: Option<OwnedSemaphorePermit>,
}

impl ActionGuard {
    /// Whether this acquisition actually holds a semaphore slot.
    /// False when gating is disabled (limit 0).
    pub fn is_gated(&self) -> bool {
        self.permit.is_some()
    }
}

/// Bounded-concurrency gate keyed by action name.
#[async_trait]
pub trait ActionLimiter: Send + Sync {
    /// Set the per-action concurrency limit. 0 disables gating. Resets all
    /// per-action semaphores; in-flight holders keep their old slots.
    fn set_limit(&self, limit: u32);

    /// Acquire a slot for `action`, waiting until one is free.
    async fn start(&self, action: &str) -> ActionGuard;

    /// Number of slots currently held for `action`.
    fn len(&self, action: &str) -> usize;
}

struct Inner {
    limit: u32,
    /// None while gating is disabled.
    actions: Option<HashMap<String, Arc<Semaphore>>>,
}

/// In-process [`ActionLimiter`] backed by one counting semaphore per action.
pub struct LocalLimiter {
    inner: Mutex<Inner>,
}

impl LocalLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                limit,
                actions: (limit > 0).then(HashMap::new),
            }),
        }
    }

    fn entry(&self, action: &str) -> Option<(Arc<Semaphore>, u32)> {
        let mut inner = self.inner.lock();
        let limit = inner.limit;
        let actions = inner.actions.as_mut()?;
        let sem = actions
            .entry(action.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit as usize)))
            .clone();
        Some((sem, limit))
    }
}

impl Default for LocalLimiter {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl ActionLimiter for LocalLimiter {
    fn set_limit(&self, limit: u32) {
        let mut inner = self.inner.lock();
        debug!(old = inner.limit, new = limit, "Resetting action limiter");
        inner.limit = limit;
        inner.actions = (limit > 0).then(HashMap::new);
    }

    async fn start(&self, action: &str) -> ActionGuard {
        // The semaphore clone is taken under the lock; the wait happens
        // outside it so other actions stay unblocked.
        let Some((sem, _)) = self.entry(action) else {
            return ActionGuard { permit: None };
        };
        // The semaphore is never closed, so acquisition only fails if the
        // limiter was reset and the old semaphore dropped mid-wait; the
        // waiter then proceeds ungated, matching the reset semantics.
        let permit = sem.acquire_owned().await.ok();
        ActionGuard { permit }
    }

    fn len(&self, action: &str) -> usize {
        let inner = self.inner.lock();
        let Some(actions) = inner.actions.as_ref() else {
            return 0;
        };
        match actions.get(action) {
            Some(sem) => (inner.limit as usize).saturating_sub(sem.available_permits()),
            None => 0,
        }
    }
}
