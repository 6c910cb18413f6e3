//! Error taxonomy: one enum per layer, unified under `LatticeError`.
//!
//! Conflict outcomes (claim contention) are statuses, not errors — see
//! `lattice-session`. Only unrecoverable internal invariants are fatal.

pub mod error_code;

mod build_error;
mod parse_error;
mod query_error;
mod session_error;
mod store_error;

pub use build_error::BuildError;
pub use parse_error::ParseError;
pub use query_error::QueryError;
pub use session_error::SessionError;
pub use store_error::StoreError;

use error_code::LatticeErrorCode;

/// Umbrella error for the whole engine.
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LatticeErrorCode for LatticeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Parse(e) => e.error_code(),
            Self::Build(e) => e.error_code(),
            Self::Query(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Io(_) => error_code::IO_ERROR,
            Self::Serialization(_) => error_code::INTERNAL,
        }
    }

    fn recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.recoverable(),
            Self::Parse(e) => e.recoverable(),
            Self::Build(e) => e.recoverable(),
            Self::Query(e) => e.recoverable(),
            Self::Session(e) => e.recoverable(),
            Self::Io(_) | Self::Serialization(_) => false,
        }
    }
}

/// Workspace-wide result alias.
pub type LatticeResult<T> = Result<T, LatticeError>;
