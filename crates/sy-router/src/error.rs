use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Operation label carried by tagged operational errors.
///
/// Callers branch on this label, never on the underlying cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    Add,
    Remove,
    Get,
    Routes,
    SetCname,
    UnsetCname,
    Swap,
    HealthCheck,
}

impl fmt::Display for RouteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RouteOp::Add => "add",
            RouteOp::Remove => "remove",
            RouteOp::Get => "get",
            RouteOp::Routes => "routes",
            RouteOp::SetCname => "set-cname",
            RouteOp::UnsetCname => "unset-cname",
            RouteOp::Swap => "swap",
            RouteOp::HealthCheck => "healthcheck",
        };
        f.write_str(label)
    }
}

/// Underlying cause of a tagged operational error.
#[derive(Error, Debug)]
pub enum OpCause {
    #[error("domain not configured for router {0}")]
    DomainNotConfigured(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum RouterError {
    /// Operation targets a backend with no canonical list.
    #[error("Backend not found")]
    BackendNotFound,

    /// Alias already registered (or found diverged and just repaired).
    #[error("CNAME already registered")]
    CNameExists,

    /// Address already present in the backend's canonical list.
    #[error("Route already present")]
    RouteExists,

    #[error("No router implementation registered for type: {0}")]
    UnknownType(String),

    /// Tagged operational failure: missing domain configuration, store
    /// connectivity failure, or a failed store command.
    #[error("[router {op}] {source}")]
    Op {
        op: RouteOp,
        #[source]
        source: OpCause,
    },
}

impl RouterError {
    pub fn op(op: RouteOp, cause: impl Into<OpCause>) -> Self {
        RouterError::Op {
            op,
            source: cause.into(),
        }
    }

    /// The operation label, when this is a tagged operational error.
    pub fn op_label(&self) -> Option<RouteOp> {
        match self {
            RouterError::Op { op, .. } => Some(*op),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
