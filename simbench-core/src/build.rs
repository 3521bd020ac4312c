//! Build coordinator: builds the current tree and the baseline workspace in
//! parallel.
//!
//! The two trees are disjoint, so the builds share nothing. The first failure
//! wins; dropping the other build future kills its process.

use crate::error::{BenchError, BenchResult};
use crate::process::{run_with_timeout, ProcessOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Label of the current-tree candidate.
pub const CURRENT: &str = "Current";
/// Label of the baseline-workspace candidate.
pub const BASELINE: &str = "Baseline";

/// How to build a tree and where the binary lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Binary path relative to the built tree.
    pub artifact: PathBuf,
    pub timeout_secs: u64,
    /// Stream build output instead of capturing it.
    pub verbose: bool,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            program: "swift".to_string(),
            args: vec!["build".into(), "-c".into(), "release".into()],
            artifact: PathBuf::from(".build/release/iosef"),
            timeout_secs: 300,
            verbose: false,
        }
    }
}

impl BuildSpec {
    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A binary produced by one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub candidate_name: String,
    pub binary_path: PathBuf,
    pub built_at: DateTime<Utc>,
}

/// Artifacts of one coordinated build.
#[derive(Debug, Clone)]
pub struct BuildSet {
    pub current: BuildArtifact,
    pub baseline: Option<BuildArtifact>,
}

pub struct BuildCoordinator {
    spec: BuildSpec,
}

impl BuildCoordinator {
    pub fn new(spec: BuildSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    /// Build the current tree and, if given, the baseline workspace
    /// concurrently.
    pub async fn build(&self, current_dir: &Path, baseline_dir: Option<&Path>) -> BenchResult<BuildSet> {
        match baseline_dir {
            Some(baseline_dir) => {
                info!("Building current + baseline binaries in parallel ({})", self.spec.describe());
                let (current, baseline) = tokio::try_join!(
                    self.build_tree(CURRENT, current_dir),
                    self.build_tree(BASELINE, baseline_dir),
                )?;
                Ok(BuildSet {
                    current,
                    baseline: Some(baseline),
                })
            }
            None => {
                info!("Building current release binary ({})", self.spec.describe());
                let current = self.build_tree(CURRENT, current_dir).await?;
                Ok(BuildSet {
                    current,
                    baseline: None,
                })
            }
        }
    }

    /// Build one tree and verify its binary exists.
    pub async fn build_tree(&self, candidate: &str, dir: &Path) -> BenchResult<BuildArtifact> {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .current_dir(dir)
            .stdin(Stdio::null());
        if self.spec.verbose {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let timeout = Duration::from_secs(self.spec.timeout_secs);
        match run_with_timeout(&mut cmd, timeout).await? {
            ProcessOutcome::TimedOut => {
                return Err(BenchError::timeout(
                    format!("{candidate} build"),
                    self.spec.timeout_secs,
                ))
            }
            ProcessOutcome::Completed(output) if !output.status.success() => {
                return Err(BenchError::Build {
                    candidate: candidate.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
            ProcessOutcome::Completed(_) => {}
        }

        let binary_path = dir.join(&self.spec.artifact);
        if !binary_path.is_file() {
            return Err(BenchError::ArtifactMissing {
                candidate: candidate.to_string(),
                path: binary_path,
            });
        }

        info!(candidate, binary = %binary_path.display(), "Built successfully");
        Ok(BuildArtifact {
            candidate_name: candidate.to_string(),
            binary_path,
            built_at: Utc::now(),
        })
    }
}
