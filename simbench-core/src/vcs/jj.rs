//! Jujutsu backend.

use super::{run_vcs, RevisionRef, VersionControl};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One `<id>\n<first line>\n` record per matched revision.
const LOG_TEMPLATE: &str = r#"change_id ++ "\n" ++ description.first_line() ++ "\n""#;

/// `jj`-backed workspaces, run from the repository root.
pub struct JujutsuVcs {
    program: String,
    repo_root: PathBuf,
}

impl JujutsuVcs {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            program: "jj".to_string(),
            repo_root: repo_root.as_ref().to_path_buf(),
        }
    }

    /// Use a different `jj` executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl VersionControl for JujutsuVcs {
    fn program(&self) -> &str {
        &self.program
    }

    async fn resolve(&self, spec: &str) -> BenchResult<RevisionRef> {
        let stdout = run_vcs(
            &self.program,
            &["log", "-r", spec, "--no-graph", "-T", LOG_TEMPLATE],
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
        run_vcs(
            &self.program,
            &["log", "-r", "@", "--no-graph", "-T", "change_id"],
            &self.repo_root,
        )
        .await
    }

    async fn add_workspace(&self, dir: &Path, name: &str, rev: &RevisionRef) -> BenchResult<()> {
        let dir_arg = dir.display().to_string();
        run_vcs(
            &self.program,
            &["workspace", "add", &dir_arg, "--name", name, "-r", &rev.stable_id],
            &self.repo_root,
        )
        .await
        .map(|_| ())
    }

    async fn rebind_workspace(&self, dir: &Path, rev: &RevisionRef) -> BenchResult<()> {
        // The repo may have moved on since the workspace was last used.
        if let Err(e) = run_vcs(&self.program, &["workspace", "update-stale"], dir).await {
            tracing::debug!("jj workspace update-stale: {e}");
        }
        run_vcs(&self.program, &["rebase", "-d", &rev.stable_id], dir)
            .await
            .map(|_| ())
    }

    async fn forget_workspace(&self, _dir: &Path, name: &str) -> BenchResult<()> {
        run_vcs(&self.program, &["workspace", "forget", name], &self.repo_root)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Fake `jj` that appends `<cwd>|<args>` to `calls.log` and answers
    /// `log` queries. `update-stale` fails when `STALE_FAILS` exists.
    const FAKE_JJ: &str = r#"#!/bin/sh
here=$(cd "$(dirname "$0")" && pwd -P)
printf '%s|%s\n' "$(pwd -P)" "$*" >> "$here/calls.log"
case "$1 $2" in
  "log -r")
    case "$3" in
      @) printf 'currentchangeid' ;;
      main) printf 'qpvuntsmwlqt\nFix tap latency\n' ;;
      both) printf 'qpvuntsmwlqt\nFix tap latency\nzzzzzzzzzzzz\nOther change\n' ;;
      *) echo "Error: Revision \"$3\" doesn't exist" >&2; exit 1 ;;
    esac ;;
  "workspace update-stale")
    if [ -e "$here/STALE_FAILS" ]; then
      echo "Error: workspace is not stale" >&2
      exit 1
    fi ;;
esac
"#;

    struct FakeJj {
        bin_dir: TempDir,
        repo: TempDir,
    }

    impl FakeJj {
        fn new() -> Self {
            let bin_dir = tempfile::tempdir().unwrap();
            let script = bin_dir.path().join("jj");
            std::fs::write(&script, FAKE_JJ).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            Self {
                bin_dir,
                repo: tempfile::tempdir().unwrap(),
            }
        }

        fn vcs(&self) -> JujutsuVcs {
            let program = self.bin_dir.path().join("jj").display().to_string();
            JujutsuVcs::new(self.repo.path()).with_program(program)
        }

        /// Recorded `(cwd, args)` pairs in call order.
        fn calls(&self) -> Vec<(PathBuf, String)> {
            std::fs::read_to_string(self.bin_dir.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .filter_map(|line| line.split_once('|'))
                .map(|(cwd, args)| (PathBuf::from(cwd), args.to_string()))
                .collect()
        }

        fn repo_root(&self) -> PathBuf {
            self.repo.path().canonicalize().unwrap()
        }
    }

    fn revision(stable_id: &str) -> RevisionRef {
        RevisionRef {
            spec: "main".to_string(),
            stable_id: stable_id.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_runs_log_in_repo_root() {
        let fake = FakeJj::new();
        let vcs = fake.vcs();

        let rev = vcs.resolve("main").await.unwrap();
        assert_eq!(rev.stable_id, "qpvuntsmwlqt");
        assert_eq!(rev.display_label(), "qpvuntsm: Fix tap latency");
        assert_eq!(vcs.current_id().await.unwrap(), "currentchangeid");

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, fake.repo_root());
        assert_eq!(
            calls[0].1,
            format!("log -r main --no-graph -T {LOG_TEMPLATE}")
        );
        assert_eq!(calls[1].1, "log -r @ --no-graph -T change_id");
    }

    #[tokio::test]
    async fn test_resolve_unknown_revision() {
        let fake = FakeJj::new();
        let err = fake.vcs().resolve("nope").await.unwrap_err();
        assert!(matches!(err, BenchError::RevisionResolution { .. }));
    }

    #[tokio::test]
    async fn test_resolve_rejects_multiple_revisions() {
        let fake = FakeJj::new();
        let err = fake.vcs().resolve("both").await.unwrap_err();
        match err {
            BenchError::RevisionResolution { spec, message } => {
                assert_eq!(spec, "both");
                assert!(message.contains("more than one revision"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_and_forget_run_in_repo_root() {
        let fake = FakeJj::new();
        let vcs = fake.vcs();
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("baseline");

        vcs.add_workspace(&dir, "bench-baseline", &revision("qpvuntsmwlqt"))
            .await
            .unwrap();
        vcs.forget_workspace(&dir, "bench-baseline").await.unwrap();

        let calls = fake.calls();
        assert_eq!(
            calls,
            vec![
                (
                    fake.repo_root(),
                    format!(
                        "workspace add {} --name bench-baseline -r qpvuntsmwlqt",
                        dir.display()
                    )
                ),
                (fake.repo_root(), "workspace forget bench-baseline".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rebind_runs_in_workspace_dir() {
        let fake = FakeJj::new();
        let workspace = tempfile::tempdir().unwrap();

        fake.vcs()
            .rebind_workspace(workspace.path(), &revision("qpvuntsmwlqt"))
            .await
            .unwrap();

        let ws = workspace.path().canonicalize().unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                (ws.clone(), "workspace update-stale".to_string()),
                (ws, "rebase -d qpvuntsmwlqt".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rebind_continues_when_update_stale_fails() {
        let fake = FakeJj::new();
        std::fs::write(fake.bin_dir.path().join("STALE_FAILS"), "").unwrap();
        let workspace = tempfile::tempdir().unwrap();

        fake.vcs()
            .rebind_workspace(workspace.path(), &revision("zzzzzzzzzzzz"))
            .await
            .unwrap();

        let args: Vec<String> = fake.calls().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, vec!["workspace update-stale", "rebase -d zzzzzzzzzzzz"]);
    }

    #[test]
    fn test_program_is_configurable() {
        let vcs = JujutsuVcs::new("/repo");
        assert_eq!(vcs.program(), "jj");
        assert_eq!(vcs.with_program("/opt/jj").program(), "/opt/jj");
    }
}
