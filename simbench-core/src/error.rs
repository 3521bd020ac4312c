//! Benchmark run error types
//!
//! Candidate-scoped failures (a reference that fails its smoke test) are
//! degraded by the caller; everything else aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for benchmark operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors that can occur while orchestrating a benchmark run
#[derive(Error, Debug)]
pub enum BenchError {
    /// Required external tools are not on PATH
    #[error("Missing required tools: {}", tools.join(", "))]
    PrerequisiteMissing { tools: Vec<String> },

    /// No booted simulator and no device id supplied
    #[error("No booted iOS Simulator found")]
    DeviceNotFound,

    /// Version control could not resolve a revision specifier
    #[error("Failed to resolve revision '{spec}': {message}")]
    RevisionResolution { spec: String, message: String },

    /// Baseline workspace could not be created
    #[error("Failed to create baseline workspace at {dir}: {message}")]
    WorkspaceCreation { dir: PathBuf, message: String },

    /// Any other version-control command failure
    #[error("Version control operation failed: {operation} - {message}")]
    Vcs { operation: String, message: String },

    /// Build tool exited non-zero
    #[error("{candidate} build failed")]
    Build { candidate: String, stderr: String },

    /// Build reported success but the binary is absent
    #[error("{candidate} binary not found at {}", path.display())]
    ArtifactMissing { candidate: String, path: PathBuf },

    /// A candidate failed its smoke test
    #[error("{candidate} smoke test failed: {message}")]
    SmokeTest { candidate: String, message: String },

    /// The measurement tool failed for an operation
    #[error("Measurement of '{operation}' failed: {message}")]
    MeasurementTool { operation: String, message: String },

    /// An external process hit its deadline
    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    /// Operation parameter rejected by the command builder
    #[error("Invalid parameter '{key}' for operation '{operation}': {message}")]
    InvalidParameter {
        operation: String,
        key: String,
        message: String,
    },

    /// Operator supplied an unusable configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Operation catalog could not be loaded
    #[error("Invalid operation catalog: {message}")]
    Catalog { message: String },

    /// Run controller attempted an illegal state transition
    #[error("Invalid state transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BenchError {
    /// Create a version-control error
    pub fn vcs(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Vcs {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create a smoke test error
    pub fn smoke(candidate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SmokeTest {
            candidate: candidate.into(),
            message: message.into(),
        }
    }

    /// Create a measurement tool error
    pub fn measurement(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MeasurementTool {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            secs,
        }
    }

    /// Whether the failure only affects one candidate and the run may continue
    /// without it.
    pub fn is_candidate_scoped(&self) -> bool {
        matches!(self, Self::SmokeTest { .. })
    }

    /// Diagnostic output worth echoing after the one-line message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Build { stderr, .. } if !stderr.trim().is_empty() => Some(stderr.as_str()),
            _ => None,
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::PrerequisiteMissing { tools } => {
                let hints: Vec<String> = tools.iter().map(|t| install_hint(t)).collect();
                Some(format!("Install with: {}", hints.join("; ")))
            }
            Self::DeviceNotFound => {
                Some("Boot one first: xcrun simctl boot <device-udid>".to_string())
            }
            Self::RevisionResolution { .. } => Some(
                "Check the revision exists, or pass --no-from-version to skip self-comparison"
                    .to_string(),
            ),
            Self::WorkspaceCreation { dir, .. } => Some(format!(
                "Remove {} and forget the stale workspace, then retry",
                dir.display()
            )),
            Self::Build { .. } => Some("Re-run with --verbose to see build output".to_string()),
            Self::ArtifactMissing { .. } => {
                Some("Check --build-artifact matches the build tool's output path".to_string())
            }
            Self::Config { .. } | Self::Catalog { .. } => {
                Some("Run with --help to list valid options".to_string())
            }
            _ => None,
        }
    }
}

/// Install command for a known external tool.
fn install_hint(tool: &str) -> String {
    match tool {
        "hyperfine" => "brew install hyperfine".to_string(),
        "mcp" => "brew tap f/mcptools && brew install mcp".to_string(),
        "node" => "brew install node".to_string(),
        "jj" => "brew install jj".to_string(),
        "swift" => "xcode-select --install".to_string(),
        other => format!("install {other}"),
    }
}
