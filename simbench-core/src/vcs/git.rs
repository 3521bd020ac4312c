//! Git backend: baseline workspaces are detached worktrees.

use super::{run_vcs, RevisionRef, VersionControl};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// `git worktree`-backed workspaces, run from the repository root.
pub struct GitVcs {
    repo_root: PathBuf,
}

impl GitVcs {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            repo_root: repo_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl VersionControl for GitVcs {
    fn program(&self) -> &str {
        "git"
    }

    async fn resolve(&self, spec: &str) -> BenchResult<RevisionRef> {
        let stdout = run_vcs(
            "git",
            &["log", "-1", "--format=%H%n%s", spec, "--"],
            &self.repo_root,
        )
        .await
        .map_err(|e| BenchError::RevisionResolution {
            spec: spec.to_string(),
            message: e.to_string(),
        })?;
        RevisionRef::from_log_output(spec, &stdout)
    }

    async fn current_id(&self) -> BenchResult<String> {
        run_vcs("git", &["rev-parse", "HEAD"], &self.repo_root).await
    }

    async fn add_workspace(&self, dir: &Path, _name: &str, rev: &RevisionRef) -> BenchResult<()> {
        let dir_arg = dir.display().to_string();
        run_vcs(
            "git",
            &["worktree", "add", "--detach", &dir_arg, &rev.stable_id],
            &self.repo_root,
        )
        .await
        .map(|_| ())
    }

    async fn rebind_workspace(&self, dir: &Path, rev: &RevisionRef) -> BenchResult<()> {
        // Untracked build output survives a checkout, which is the point.
        run_vcs("git", &["checkout", "--detach", &rev.stable_id], dir)
            .await
            .map(|_| ())
    }

    async fn forget_workspace(&self, dir: &Path, _name: &str) -> BenchResult<()> {
        if dir.exists() {
            let dir_arg = dir.display().to_string();
            run_vcs(
                "git",
                &["worktree", "remove", "--force", &dir_arg],
                &self.repo_root,
            )
            .await
            .map(|_| ())
        } else {
            run_vcs("git", &["worktree", "prune"], &self.repo_root)
                .await
                .map(|_| ())
        }
    }
}
