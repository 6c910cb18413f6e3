//! Graph-store-layer errors.

use super::error_code::{self, LatticeErrorCode};

/// Errors from the graph store client and its backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("host unresolvable: {host}")]
    HostUnresolvable { host: String },

    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("not connected to graph store")]
    NotConnected,

    #[error("query syntax error: {message}")]
    Syntax { message: String },

    #[error("constraint violation: {message}")]
    Constraint { message: String },

    #[error("backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Transient errors are retried exactly once with a fresh session;
    /// everything else is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::NotConnected
        )
    }
}

impl LatticeErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } | Self::Constraint { .. } => error_code::STORE_QUERY_FAILED,
            _ => error_code::STORE_UNAVAILABLE,
        }
    }

    fn recoverable(&self) -> bool {
        !matches!(self, Self::Syntax { .. })
    }
}
