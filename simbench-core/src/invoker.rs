//! Measurement invoker: smoke-tests candidates and runs the measurement tool.
//!
//! References that fail their smoke test are dropped from the operation with a
//! warning. The primary is always passed first so position 0 of the export is
//! the primary.

use crate::command::Invocation;
use crate::error::{BenchError, BenchResult};
use crate::measurement::{command_name, MeasurementResult};
use crate::process::{run_shell, run_with_timeout, ProcessOutcome};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Benchmark category; decides artifact names and report sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Protocol-level calls through the MCP client.
    Mcp,
    /// Direct command-line invocations.
    Cli,
}

impl Category {
    /// Artifact filename prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Mcp => "mcp_",
            Self::Cli => "cli_",
        }
    }

    pub fn artifact_stem(self, operation: &str) -> String {
        format!("{}{}", self.prefix(), operation)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mcp => write!(f, "MCP"),
            Self::Cli => write!(f, "CLI"),
        }
    }
}

/// Role of a candidate in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Primary,
    SelfBaseline,
    External,
}

/// One implementation measured for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub kind: CandidateKind,
    pub invocation: Invocation,
}

impl Candidate {
    pub fn new(label: impl Into<String>, kind: CandidateKind, invocation: Invocation) -> Self {
        Self {
            label: label.into(),
            kind,
            invocation,
        }
    }
}

/// The external measurement tool and its repetition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementTool {
    pub program: String,
    pub warmup: u32,
    pub min_runs: u32,
    pub timeout: Duration,
}

impl MeasurementTool {
    /// Arguments for one operation across `candidates`, in order.
    pub fn args(
        &self,
        operation: &str,
        candidates: &[Candidate],
        json_path: &Path,
        markdown_path: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "--warmup".to_string(),
            self.warmup.to_string(),
            "--min-runs".to_string(),
            self.min_runs.to_string(),
        ];
        for candidate in candidates {
            args.push("--command-name".into());
            args.push(command_name(&candidate.label, operation));
        }
        for candidate in candidates {
            args.push(candidate.invocation.wrapped.clone());
        }
        args.push("--export-json".into());
        args.push(json_path.display().to_string());
        args.push("--export-markdown".into());
        args.push(markdown_path.display().to_string());
        args
    }
}

pub struct MeasurementInvoker {
    tool: MeasurementTool,
    results_dir: PathBuf,
    smoke_timeout: Duration,
}

impl MeasurementInvoker {
    pub fn new(tool: MeasurementTool, results_dir: impl Into<PathBuf>, smoke_timeout: Duration) -> Self {
        Self {
            tool,
            results_dir: results_dir.into(),
            smoke_timeout,
        }
    }

    pub fn tool(&self) -> &MeasurementTool {
        &self.tool
    }

    /// JSON and markdown artifact paths for an operation.
    pub fn artifact_paths(&self, category: Category, operation: &str) -> (PathBuf, PathBuf) {
        let stem = category.artifact_stem(operation);
        (
            self.results_dir.join(format!("{stem}.json")),
            self.results_dir.join(format!("{stem}.md")),
        )
    }

    /// Run a candidate's bare command once under the smoke timeout.
    pub async fn smoke_test(&self, candidate: &Candidate) -> BenchResult<()> {
        let outcome = run_shell(&candidate.invocation.command, self.smoke_timeout).await?;
        if outcome.success() {
            Ok(())
        } else {
            Err(BenchError::smoke(
                &candidate.label,
                outcome.failure_message(self.smoke_timeout),
            ))
        }
    }

    /// Measure one operation across the candidates that survive smoke tests.
    pub async fn measure(
        &self,
        category: Category,
        operation: &str,
        candidates: Vec<Candidate>,
    ) -> BenchResult<MeasurementResult> {
        match candidates.first() {
            Some(first) if first.kind == CandidateKind::Primary => {}
            _ => {
                return Err(BenchError::config(format!(
                    "'{operation}': the primary candidate must be first"
                )))
            }
        }
        info!(category = %category, operation, "Benchmarking");

        let mut surviving = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.kind == CandidateKind::Primary {
                surviving.push(candidate);
                continue;
            }
            match self.smoke_test(&candidate).await {
                Ok(()) => surviving.push(candidate),
                Err(e) => warn!(
                    "{e}; benchmarking '{operation}' without {}",
                    candidate.label
                ),
            }
        }

        let (json_path, markdown_path) = self.artifact_paths(category, operation);
        let args = self.tool.args(operation, &surviving, &json_path, &markdown_path);

        let mut cmd = Command::new(&self.tool.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        match run_with_timeout(&mut cmd, self.tool.timeout).await? {
            ProcessOutcome::TimedOut => {
                return Err(BenchError::measurement(
                    operation,
                    format!("timed out after {}s", self.tool.timeout.as_secs()),
                ))
            }
            ProcessOutcome::Completed(output) if !output.status.success() => {
                return Err(BenchError::measurement(
                    operation,
                    format!("{} exited with {}", self.tool.program, output.status),
                ))
            }
            ProcessOutcome::Completed(_) => {}
        }

        MeasurementResult::read(&json_path, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(label: &str, kind: CandidateKind, command: &str) -> Candidate {
        Candidate::new(
            label,
            kind,
            Invocation {
                command: command.to_string(),
                wrapped: format!("wrap -- {command}"),
            },
        )
    }

    fn tool() -> MeasurementTool {
        MeasurementTool {
            program: "hyperfine".into(),
            warmup: 2,
            min_runs: 5,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_category_naming() {
        assert_eq!(Category::Mcp.artifact_stem("tap"), "mcp_tap");
        assert_eq!(Category::Cli.artifact_stem("tap"), "cli_tap");
        assert_eq!(Category::Cli.to_string(), "CLI");
    }

    #[test]
    fn test_tool_args_keep_primary_first() {
        let candidates = vec![
            candidate("swift", CandidateKind::Primary, "a"),
            candidate("node", CandidateKind::External, "b"),
        ];
        let args = tool().args(
            "tap",
            &candidates,
            Path::new("/r/mcp_tap.json"),
            Path::new("/r/mcp_tap.md"),
        );
        assert_eq!(
            args,
            vec![
                "--warmup",
                "2",
                "--min-runs",
                "5",
                "--command-name",
                "swift: tap",
                "--command-name",
                "node: tap",
                "wrap -- a",
                "wrap -- b",
                "--export-json",
                "/r/mcp_tap.json",
                "--export-markdown",
                "/r/mcp_tap.md",
            ]
        );
    }

    #[tokio::test]
    async fn test_smoke_test_outcomes() {
        let invoker = MeasurementInvoker::new(tool(), "/tmp", Duration::from_secs(5));
        assert!(invoker
            .smoke_test(&candidate("ok", CandidateKind::External, "true"))
            .await
            .is_ok());
        let err = invoker
            .smoke_test(&candidate("bad", CandidateKind::External, "echo nope >&2; false"))
            .await
            .unwrap_err();
        assert!(err.is_candidate_scoped());
        assert_eq!(err.to_string(), "bad smoke test failed: nope");
    }

    #[tokio::test]
    async fn test_measure_requires_primary_first() {
        let invoker = MeasurementInvoker::new(tool(), "/tmp", Duration::from_secs(5));
        let err = invoker
            .measure(
                Category::Mcp,
                "tap",
                vec![candidate("node", CandidateKind::External, "true")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Config { .. }));
    }
}
