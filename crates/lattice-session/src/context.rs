//! Session/project context: workspace root, source dir, project id, and
//! the runtime-path fallback for container mounts.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use lattice_core::config::LatticeConfig;
use lattice_core::errors::BuildError;

/// The active scope every tool call resolves against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub workspace_root: PathBuf,
    /// Always absolute once resolved.
    pub source_dir: PathBuf,
    pub project_id: String,
    /// Stable digest of the workspace root path.
    pub project_fingerprint: String,
}

/// Tool-call arguments that may override the active context.
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    pub workspace_root: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub project_id: Option<String>,
}

/// Merge order: explicit args > active session > config defaults.
/// `project_id` defaults to the workspace basename, `source_dir` to
/// `<workspaceRoot>/src`.
pub fn resolve_project_context(
    args: &ResolveArgs,
    active: Option<&SessionContext>,
    config: &LatticeConfig,
) -> Result<SessionContext, BuildError> {
    let workspace_root = args
        .workspace_root
        .clone()
        .or_else(|| active.map(|c| c.workspace_root.clone()))
        .or_else(|| config.workspace_root.clone())
        .ok_or_else(|| BuildError::WorkspaceNotFound {
            path: "<unset>".to_string(),
        })?;

    let source_dir = args
        .source_dir
        .clone()
        .or_else(|| {
            // An active session's source dir only carries over when the
            // workspace didn't change.
            active
                .filter(|c| c.workspace_root == workspace_root)
                .map(|c| c.source_dir.clone())
        })
        .or_else(|| config.source_dir.clone())
        .unwrap_or_else(|| PathBuf::from("src"));
    let source_dir = if source_dir.is_absolute() {
        source_dir
    } else {
        workspace_root.join(source_dir)
    };

    let project_id = args
        .project_id
        .clone()
        .or_else(|| {
            active
                .filter(|c| c.workspace_root == workspace_root)
                .map(|c| c.project_id.clone())
        })
        .or_else(|| config.project_id.clone())
        .unwrap_or_else(|| basename(&workspace_root));

    Ok(SessionContext {
        project_fingerprint: fingerprint(&workspace_root),
        workspace_root,
        source_dir,
        project_id,
    })
}

/// Result of checking a context against the current runtime.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptOutcome {
    pub context: SessionContext,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
}

/// Verify the workspace is reachable from this runtime; when it is not
/// and the fallback is allowed, swap to the configured mount root.
pub fn adapt_workspace_for_runtime(
    context: SessionContext,
    config: &LatticeConfig,
) -> Result<AdaptOutcome, BuildError> {
    if context.workspace_root.is_dir() {
        return Ok(AdaptOutcome {
            context,
            used_fallback: false,
            fallback_reason: None,
        });
    }

    let requested = context.workspace_root.display().to_string();
    if !config.effective_allow_runtime_path_fallback() {
        return Err(BuildError::WorkspacePathSandboxed { path: requested });
    }

    let mount = config.effective_runtime_fallback_root();
    let candidate = mount.join(basename(&context.workspace_root));
    let fallback_root = if candidate.is_dir() {
        candidate
    } else if mount.is_dir() {
        mount
    } else {
        warn!(path = %requested, "workspace unreachable and no mount fallback present");
        return Err(BuildError::WorkspacePathSandboxed { path: requested });
    };

    info!(
        from = %requested,
        to = %fallback_root.display(),
        "workspace path swapped for runtime mount"
    );

    // Re-root the source dir under the fallback.
    let source_dir = match context.source_dir.strip_prefix(&context.workspace_root) {
        Ok(suffix) => fallback_root.join(suffix),
        Err(_) => fallback_root.join("src"),
    };

    Ok(AdaptOutcome {
        context: SessionContext {
            project_fingerprint: fingerprint(&fallback_root),
            workspace_root: fallback_root,
            source_dir,
            project_id: context.project_id,
        },
        used_fallback: true,
        fallback_reason: Some(format!("{requested} is not reachable from this runtime")),
    })
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

fn fingerprint(path: &Path) -> String {
    format!(
        "{:016x}",
        xxhash_rust::xxh3::xxh3_64(path.to_string_lossy().as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_derive_from_workspace_root() {
        let args = ResolveArgs {
            workspace_root: Some(PathBuf::from("/ws/demo-app")),
            ..Default::default()
        };
        let ctx = resolve_project_context(&args, None, &LatticeConfig::default()).unwrap();
        assert_eq!(ctx.project_id, "demo-app");
        assert_eq!(ctx.source_dir, PathBuf::from("/ws/demo-app/src"));
        assert!(!ctx.project_fingerprint.is_empty());
    }

    #[test]
    fn args_override_active_session() {
        let active = SessionContext {
            workspace_root: PathBuf::from("/ws/old"),
            source_dir: PathBuf::from("/ws/old/src"),
            project_id: "old".to_string(),
            project_fingerprint: "f".to_string(),
        };
        let args = ResolveArgs {
            workspace_root: Some(PathBuf::from("/ws/new")),
            ..Default::default()
        };
        let ctx = resolve_project_context(&args, Some(&active), &LatticeConfig::default()).unwrap();
        assert_eq!(ctx.workspace_root, PathBuf::from("/ws/new"));
        // Stale per-workspace fields don't carry across a workspace change.
        assert_eq!(ctx.project_id, "new");
        assert_eq!(ctx.source_dir, PathBuf::from("/ws/new/src"));
    }

    #[test]
    fn missing_workspace_everywhere_is_an_error() {
        let err =
            resolve_project_context(&ResolveArgs::default(), None, &LatticeConfig::default())
                .unwrap_err();
        assert!(matches!(err, BuildError::WorkspaceNotFound { .. }));
    }

    #[test]
    fn reachable_workspace_needs_no_fallback() {
        let dir = TempDir::new().unwrap();
        let args = ResolveArgs {
            workspace_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let ctx = resolve_project_context(&args, None, &LatticeConfig::default()).unwrap();
        let outcome = adapt_workspace_for_runtime(ctx, &LatticeConfig::default()).unwrap();
        assert!(!outcome.used_fallback);
        assert!(outcome.fallback_reason.is_none());
    }

    #[test]
    fn unreachable_workspace_swaps_to_mount_when_allowed() {
        let mount = TempDir::new().unwrap();
        std::fs::create_dir_all(mount.path().join("ghost-project/src")).unwrap();

        let mut config = LatticeConfig::default();
        config.allow_runtime_path_fallback = Some(true);
        config.runtime_fallback_root = Some(mount.path().to_path_buf());

        let ctx = SessionContext {
            workspace_root: PathBuf::from("/definitely/not/here/ghost-project"),
            source_dir: PathBuf::from("/definitely/not/here/ghost-project/src"),
            project_id: "ghost-project".to_string(),
            project_fingerprint: "f".to_string(),
        };
        let outcome = adapt_workspace_for_runtime(ctx, &config).unwrap();
        assert!(outcome.used_fallback);
        assert!(outcome.fallback_reason.is_some());
        assert_eq!(
            outcome.context.workspace_root,
            mount.path().join("ghost-project")
        );
        assert_eq!(
            outcome.context.source_dir,
            mount.path().join("ghost-project/src")
        );
    }

    #[test]
    fn unreachable_workspace_without_fallback_is_sandboxed() {
        let ctx = SessionContext {
            workspace_root: PathBuf::from("/definitely/not/here"),
            source_dir: PathBuf::from("/definitely/not/here/src"),
            project_id: "x".to_string(),
            project_fingerprint: "f".to_string(),
        };
        let err = adapt_workspace_for_runtime(ctx, &LatticeConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::WorkspacePathSandboxed { .. }));
    }
}
