//! Orchestrator / context errors.

use super::error_code::{self, LatticeErrorCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    #[error("workspace not found: {path}")]
    WorkspaceNotFound { path: String },

    #[error("source dir not found: {path}")]
    SourceDirNotFound { path: String },

    #[error("workspace path not reachable from this runtime: {path}")]
    WorkspacePathSandboxed { path: String },

    #[error("a build for project {project_id} is already running")]
    BuildInProgress { project_id: String },

    #[error("build cancelled for project {project_id}")]
    Cancelled { project_id: String },
}

impl LatticeErrorCode for BuildError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::WorkspaceNotFound { .. } => error_code::WORKSPACE_NOT_FOUND,
            Self::SourceDirNotFound { .. } => error_code::SOURCE_DIR_NOT_FOUND,
            Self::WorkspacePathSandboxed { .. } => error_code::WORKSPACE_PATH_SANDBOXED,
            Self::BuildInProgress { .. } | Self::Cancelled { .. } => error_code::BUILD_IN_PROGRESS,
        }
    }

    fn recoverable(&self) -> bool {
        true
    }
}
