//! Parser-adapter errors. Most parse trouble is downgraded to warnings
//! (an unreadable file still yields an empty `ParsedFile`); these variants
//! cover the cases where the adapter itself cannot proceed.

use super::error_code::{self, LatticeErrorCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported extension: {extension}")]
    UnsupportedExtension { extension: String },

    #[error("grammar failed to load for {language}: {message}")]
    GrammarUnavailable { language: String, message: String },

    #[error("unreadable file {path}: {message}")]
    Unreadable { path: String, message: String },
}

impl LatticeErrorCode for ParseError {
    fn error_code(&self) -> &'static str {
        error_code::PARSE_FAILED
    }

    fn recoverable(&self) -> bool {
        true
    }
}
