//! Retrieval / temporal query errors.

use super::error_code::{self, LatticeErrorCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("element not found: {id}")]
    ElementNotFound { id: String },

    #[error("anchor not found: {anchor}")]
    AnchorNotFound { anchor: String },
}

impl LatticeErrorCode for QueryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => error_code::INVALID_INPUT,
            Self::ElementNotFound { .. } => error_code::ELEMENT_NOT_FOUND,
            Self::AnchorNotFound { .. } => error_code::ANCHOR_NOT_FOUND,
        }
    }

    fn recoverable(&self) -> bool {
        true
    }
}
