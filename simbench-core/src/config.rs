//! Run configuration.
//!
//! `RunConfig` carries every operator value plus the paths and timeouts a run
//! threads through its components. Defaults come from the environment where
//! an override variable is set.

use crate::build::BuildSpec;
use crate::catalog::Catalog;
use crate::command::DEFAULT_INVOCATION_TIMEOUT;
use crate::error::{BenchError, BenchResult};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which benchmark categories a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchMode {
    /// Protocol-level: Swift MCP vs the reference server.
    Mcp,
    /// Direct invocation: Swift CLI vs idb/simctl.
    #[default]
    Cli,
    /// Both categories.
    All,
}

impl BenchMode {
    pub fn includes_mcp(self) -> bool {
        matches!(self, Self::Mcp | Self::All)
    }

    pub fn includes_cli(self) -> bool {
        matches!(self, Self::Cli | Self::All)
    }
}

impl fmt::Display for BenchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mcp => write!(f, "mcp"),
            Self::Cli => write!(f, "cli"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Version-control backend that stages the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    #[default]
    Jj,
    Git,
}

impl VcsKind {
    pub fn program(self) -> &'static str {
        match self {
            Self::Jj => "jj",
            Self::Git => "git",
        }
    }
}

/// Everything an operator can configure for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Primary binary, relative to the project root unless absolute. The
    /// freshly built artifact when unset.
    pub swift_bin: Option<PathBuf>,
    /// Shell fragment launching the reference protocol server.
    pub node_server: String,
    /// External direct-invocation tool.
    pub idb: PathBuf,
    pub warmup: u32,
    pub min_runs: u32,
    /// Operation name filter; empty runs everything.
    pub tools: Vec<String>,
    /// Simulator UDID; auto-detected when `None`.
    pub udid: Option<String>,
    pub mode: BenchMode,
    /// Baseline revision specifier.
    pub from_version: String,
    /// Disable self-comparison.
    pub no_from_version: bool,
    /// Skip baseline teardown so the next run builds incrementally.
    pub keep_baseline: bool,
    pub verbose: bool,
    pub results_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub workspace_name: String,
    pub project_root: PathBuf,
    pub vcs: VcsKind,
    pub build: BuildSpec,
    /// Measurement tool program.
    pub hyperfine: String,
    /// Protocol client program.
    pub mcp_client: String,
    /// Binary implementing the `deadline` subcommand.
    pub launcher: PathBuf,
    pub invocation_timeout: Duration,
    pub smoke_timeout: Duration,
    /// Upper bound for one measurement-tool run.
    pub measurement_timeout: Duration,
    /// Optional TOML catalog replacing the built-in operations.
    pub catalog: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            swift_bin: None,
            node_server: "node ../ios-simulator-mcp/build/index.js".into(),
            idb: PathBuf::from("../idb"),
            warmup: 2,
            min_runs: 5,
            tools: Vec::new(),
            udid: None,
            mode: BenchMode::default(),
            from_version: "main".into(),
            no_from_version: false,
            keep_baseline: false,
            verbose: false,
            results_dir: std::env::var("SIMBENCH_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/ios-sim-mcp-bench")),
            workspace_dir: std::env::var("SIMBENCH_WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/ios-sim-mcp-bench-baseline")),
            workspace_name: "bench-baseline".into(),
            project_root: PathBuf::from("."),
            vcs: VcsKind::default(),
            build: BuildSpec::default(),
            hyperfine: std::env::var("SIMBENCH_HYPERFINE").unwrap_or_else(|_| "hyperfine".into()),
            mcp_client: "mcp".into(),
            launcher: PathBuf::from("simbench"),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            smoke_timeout: Duration::from_secs(10),
            measurement_timeout: Duration::from_secs(1800),
            catalog: None,
        }
    }
}

impl RunConfig {
    pub fn baseline_enabled(&self) -> bool {
        !self.no_from_version
    }

    /// Binary measured as the primary: the operator's override, or the
    /// artifact the current build produced.
    pub fn primary_binary(&self, built: &Path) -> PathBuf {
        match &self.swift_bin {
            Some(path) => self.resolve(path),
            None => built.to_path_buf(),
        }
    }

    /// `path` resolved against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Script the reference server runs: the last word of its command.
    pub fn node_script(&self) -> Option<PathBuf> {
        shlex::split(&self.node_server)
            .and_then(|words| words.last().cloned())
            .map(|script| self.resolve(Path::new(&script)))
    }

    /// The catalog this run uses, before filtering.
    pub fn load_catalog(&self) -> BenchResult<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::builtin()),
        }
    }

    /// Reject configurations that cannot produce a run. Returns the filtered
    /// catalog.
    pub fn validate(&self) -> BenchResult<Catalog> {
        if self.min_runs == 0 {
            return Err(BenchError::config("--min-runs must be at least 1"));
        }
        if self.node_server.trim().is_empty() && self.mode.includes_mcp() {
            return Err(BenchError::config("--node-server must not be empty"));
        }
        if self.baseline_enabled() && self.from_version.trim().is_empty() {
            return Err(BenchError::config(
                "--from-version must not be empty (use --no-from-version to disable)",
            ));
        }
        if self.invocation_timeout.is_zero() || self.smoke_timeout.is_zero() {
            return Err(BenchError::config("timeouts must be non-zero"));
        }

        let catalog = self.load_catalog()?;
        let filtered = catalog.filtered(&self.tools);
        if self.mode.includes_mcp() && filtered.mcp.is_empty() {
            return Err(BenchError::config(format!(
                "No matching MCP tools. Available: {}",
                catalog.mcp_names().join(", ")
            )));
        }
        if self.mode.includes_cli() && filtered.cli.is_empty() {
            return Err(BenchError::config(format!(
                "No matching CLI tools. Available: {}",
                catalog.cli_names().join(", ")
            )));
        }
        Ok(filtered)
    }

    /// External tools that must be on PATH before anything runs.
    /// `vcs_program` is the backend staging the baseline.
    pub fn required_tools(&self, vcs_program: &str) -> Vec<String> {
        let mut tools = vec![self.hyperfine.clone()];
        if self.mode.includes_mcp() {
            tools.push(self.mcp_client.clone());
            if let Some(runtime) = shlex::split(&self.node_server).and_then(|w| w.first().cloned()) {
                tools.push(runtime);
            }
        }
        if self.baseline_enabled() {
            tools.push(vcs_program.to_string());
        }
        tools.push(self.build.program.clone());
        tools
    }
}
