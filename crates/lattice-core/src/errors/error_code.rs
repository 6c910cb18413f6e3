//! Stable string codes attached to every error, surfaced in tool
//! error envelopes as `error.code`.

pub const INVALID_INPUT: &str = "INVALID_INPUT";
pub const WORKSPACE_NOT_FOUND: &str = "WORKSPACE_NOT_FOUND";
pub const SOURCE_DIR_NOT_FOUND: &str = "SOURCE_DIR_NOT_FOUND";
pub const WORKSPACE_PATH_SANDBOXED: &str = "WORKSPACE_PATH_SANDBOXED";
pub const ELEMENT_NOT_FOUND: &str = "ELEMENT_NOT_FOUND";
pub const ANCHOR_NOT_FOUND: &str = "ANCHOR_NOT_FOUND";
pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
pub const STORE_QUERY_FAILED: &str = "STORE_QUERY_FAILED";
pub const PARSE_FAILED: &str = "PARSE_FAILED";
pub const BUILD_IN_PROGRESS: &str = "BUILD_IN_PROGRESS";
pub const INVALID_EPISODE: &str = "INVALID_EPISODE";
pub const IO_ERROR: &str = "IO_ERROR";
pub const INTERNAL: &str = "INTERNAL";

/// Implemented by every error enum in the workspace.
pub trait LatticeErrorCode {
    /// Stable machine-readable code for this error.
    fn error_code(&self) -> &'static str;

    /// Whether the caller can recover by correcting inputs or retrying.
    fn recoverable(&self) -> bool;
}
