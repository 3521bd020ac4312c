//! Baseline workspace manager.
//!
//! Stages an isolated checkout of a past revision without touching the
//! developer's working copy. The workspace directory is reused across runs:
//! rebinding it in place keeps the incremental build cache, and only a failed
//! rebind falls back to deleting and recreating it.

use crate::error::{BenchError, BenchResult};
use crate::vcs::{RevisionRef, VersionControl};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A staged workspace bound to one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub dir: PathBuf,
    pub revision: RevisionRef,
    /// True when an existing directory was rebound instead of recreated.
    pub reused: bool,
    /// True when the revision is the developer's current working revision.
    pub self_comparison: bool,
}

/// Owns the single baseline workspace slot.
pub struct BaselineWorkspaceManager {
    vcs: Arc<dyn VersionControl>,
    dir: PathBuf,
    name: String,
}

impl BaselineWorkspaceManager {
    pub fn new(vcs: Arc<dyn VersionControl>, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            vcs,
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a revision specifier.
    pub async fn resolve(&self, spec: &str) -> BenchResult<RevisionRef> {
        self.vcs.resolve(spec).await
    }

    /// Stage the workspace at `rev`, reusing the existing directory if
    /// possible.
    pub async fn stage(&self, rev: &RevisionRef) -> BenchResult<Workspace> {
        info!(
            spec = %rev.spec,
            label = %rev.display_label(),
            "Preparing baseline workspace"
        );

        let self_comparison = match self.vcs.current_id().await {
            Ok(current) if current == rev.stable_id => {
                warn!(
                    "Revision '{}' resolves to the current working copy; self-comparison will be meaningless",
                    rev.spec
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!("Could not read current revision: {e}");
                false
            }
        };

        if self.dir.exists() {
            match self.vcs.rebind_workspace(&self.dir, rev).await {
                Ok(()) => {
                    info!("Reused existing baseline workspace (incremental build)");
                    return Ok(self.workspace(rev, true, self_comparison));
                }
                Err(e) => {
                    warn!("Failed to update existing workspace: {e}");
                    info!("Recreating baseline workspace from scratch");
                }
            }
        }

        self.recreate(rev, self_comparison).await
    }

    async fn recreate(&self, rev: &RevisionRef, self_comparison: bool) -> BenchResult<Workspace> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| BenchError::WorkspaceCreation {
                dir: self.dir.clone(),
                message: format!("could not remove stale directory: {e}"),
            })?;
        }
        // A stale registration is expected to be absent most of the time.
        if let Err(e) = self.vcs.forget_workspace(&self.dir, &self.name).await {
            tracing::debug!("Forgetting stale workspace '{}': {e}", self.name);
        }

        if let Some(parent) = self.dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.vcs
            .add_workspace(&self.dir, &self.name, rev)
            .await
            .map_err(|e| BenchError::WorkspaceCreation {
                dir: self.dir.clone(),
                message: e.to_string(),
            })?;

        Ok(self.workspace(rev, false, self_comparison))
    }

    /// Unregister and delete the workspace directory.
    pub async fn teardown(&self) -> BenchResult<()> {
        info!(dir = %self.dir.display(), "Cleaning up baseline workspace");
        if let Err(e) = self.vcs.forget_workspace(&self.dir, &self.name).await {
            warn!("Failed to forget workspace '{}': {e}", self.name);
        }
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn workspace(&self, rev: &RevisionRef, reused: bool, self_comparison: bool) -> Workspace {
        Workspace {
            dir: self.dir.clone(),
            revision: rev.clone(),
            reused,
            self_comparison,
        }
    }
}
