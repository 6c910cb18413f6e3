//! Session, coordination, and episodic-memory errors.

use super::error_code::{self, LatticeErrorCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("invalid episode: {reason}")]
    InvalidEpisode { reason: String },

    #[error("claim not found: {claim_id}")]
    ClaimNotFound { claim_id: String },

    #[error("no active session")]
    NoActiveSession,
}

impl LatticeErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEpisode { .. } => error_code::INVALID_EPISODE,
            Self::ClaimNotFound { .. } => error_code::ELEMENT_NOT_FOUND,
            Self::NoActiveSession => error_code::INVALID_INPUT,
        }
    }

    fn recoverable(&self) -> bool {
        true
    }
}
