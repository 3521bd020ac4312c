//! Version-control backends used to stage baseline revisions.
//!
//! A backend resolves revision specifiers and manages one named, addressable
//! workspace per baseline slot. Both implementations shell out to the
//! respective CLI with a bounded timeout.

pub mod git;
pub mod jj;

use crate::error::{BenchError, BenchResult};
use crate::process::{run_program, ProcessOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use git::GitVcs;
pub use jj::JujutsuVcs;

/// Bound for a single version-control command.
pub const VCS_TIMEOUT: Duration = Duration::from_secs(30);

/// A revision specifier resolved to a stable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRef {
    /// What the operator asked for (`main`, `@-`, a change id...).
    pub spec: String,
    /// Stable id (change id or commit hash).
    pub stable_id: String,
    /// First line of the revision description, if any.
    pub description: Option<String>,
}

impl RevisionRef {
    pub fn short_id(&self) -> &str {
        let end = self
            .stable_id
            .char_indices()
            .nth(8)
            .map_or(self.stable_id.len(), |(i, _)| i);
        &self.stable_id[..end]
    }

    /// `short_id: description`, or just the short id.
    pub fn display_label(&self) -> String {
        match &self.description {
            Some(desc) => format!("{}: {}", self.short_id(), desc),
            None => self.short_id().to_string(),
        }
    }

    /// Parse `<id>\n<description>` output shared by both backends.
    ///
    /// Output describing more than one revision is rejected.
    pub(crate) fn from_log_output(spec: &str, stdout: &str) -> BenchResult<Self> {
        let mut lines = stdout.lines();
        let stable_id = lines.next().unwrap_or_default().trim().to_string();
        if stable_id.is_empty() {
            return Err(BenchError::RevisionResolution {
                spec: spec.to_string(),
                message: "empty revision id".into(),
            });
        }
        let description = lines
            .next()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);
        if lines.any(|line| !line.trim().is_empty()) {
            return Err(BenchError::RevisionResolution {
                spec: spec.to_string(),
                message: "matches more than one revision".into(),
            });
        }
        Ok(Self {
            spec: spec.to_string(),
            stable_id,
            description,
        })
    }
}

/// Version-control collaborator contract.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Executable name, checked as a prerequisite.
    fn program(&self) -> &str;

    /// Resolve a specifier to a stable id plus description.
    async fn resolve(&self, spec: &str) -> BenchResult<RevisionRef>;

    /// Stable id of the developer's current working revision.
    async fn current_id(&self) -> BenchResult<String>;

    /// Create a workspace named `name` at `dir`, bound to `rev`.
    async fn add_workspace(&self, dir: &Path, name: &str, rev: &RevisionRef) -> BenchResult<()>;

    /// Move an existing workspace to `rev` in place.
    async fn rebind_workspace(&self, dir: &Path, rev: &RevisionRef) -> BenchResult<()>;

    /// Drop the repository's registration of the workspace.
    async fn forget_workspace(&self, dir: &Path, name: &str) -> BenchResult<()>;
}

/// Run a VCS command, mapping non-zero exit and timeout to `BenchError::Vcs`.
pub(crate) async fn run_vcs(
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> BenchResult<String> {
    let outcome = run_program(program, args, Some(cwd), VCS_TIMEOUT).await?;
    match &outcome {
        ProcessOutcome::Completed(_) if outcome.success() => Ok(outcome.stdout()),
        ProcessOutcome::TimedOut => Err(BenchError::timeout(
            format!("{program} {}", args.join(" ")),
            VCS_TIMEOUT.as_secs(),
        )),
        ProcessOutcome::Completed(_) => Err(BenchError::vcs(
            format!("{program} {}", args.join(" ")),
            outcome.failure_message(VCS_TIMEOUT),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_log_output_with_description() {
        let rev = RevisionRef::from_log_output("main", "qpvuntsmwlqt\nFix tap latency\n").unwrap();
        assert_eq!(rev.stable_id, "qpvuntsmwlqt");
        assert_eq!(rev.short_id(), "qpvuntsm");
        assert_eq!(rev.display_label(), "qpvuntsm: Fix tap latency");
    }

    #[test]
    fn test_from_log_output_without_description() {
        let rev = RevisionRef::from_log_output("@-", "abc\n   \n").unwrap();
        assert_eq!(rev.description, None);
        assert_eq!(rev.display_label(), "abc");
    }

    #[test]
    fn test_from_log_output_rejects_several_revisions() {
        let err = RevisionRef::from_log_output(
            "main | @-",
            "qpvuntsmwlqt\nFix tap latency\nzzzzzzzzzzzz\nOther change\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one revision"), "{err}");

        let err = RevisionRef::from_log_output("all()", "aaa\n\nbbb\n\n").unwrap_err();
        assert!(matches!(err, BenchError::RevisionResolution { .. }));
    }

    #[test]
    fn test_from_log_output_empty() {
        let err = RevisionRef::from_log_output("nope", "").unwrap_err();
        assert!(matches!(err, BenchError::RevisionResolution { .. }));
    }
}
