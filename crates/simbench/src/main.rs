//! Benchmark the simulator MCP server against its previous revision and
//! against external reference tools.
//!
//! # Usage
//!
//! ```bash
//! # Swift CLI vs idb, self-compared against `main`
//! simbench
//!
//! # Swift MCP vs Node MCP, compared against the parent change, keep the
//! # baseline workspace for the next run
//! simbench --mode mcp --from-version @- --keep-baseline
//!
//! # Only some operations, no self-comparison
//! simbench --tool tap --tool describe_point --no-from-version
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use simbench_core::process::run_deadline;
use simbench_core::{BenchError, BenchMode, RunConfig, RunController, VcsKind};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the Swift MCP binary (defaults to the freshly built artifact)
    #[arg(long)]
    swift_bin: Option<PathBuf>,

    /// Node MCP server command
    #[arg(long, default_value = "node ../ios-simulator-mcp/build/index.js")]
    node_server: String,

    /// Path to the idb binary
    #[arg(long, default_value = "../idb")]
    idb: PathBuf,

    /// Measurement tool warmup runs
    #[arg(long, default_value_t = 2)]
    warmup: u32,

    /// Measurement tool minimum runs
    #[arg(long, default_value_t = 5)]
    min_runs: u32,

    /// Only benchmark specific tool(s). Can be repeated.
    #[arg(long = "tool")]
    tools: Vec<String>,

    /// Simulator UDID (auto-detected if omitted)
    #[arg(long)]
    udid: Option<String>,

    /// mcp (Swift vs Node MCP), cli (Swift CLI vs idb), or all
    #[arg(long, value_enum, default_value_t = ModeArg::Cli)]
    mode: ModeArg,

    /// Revision to use as self-comparison baseline
    #[arg(long, default_value = "main")]
    from_version: String,

    /// Disable self-comparison (only compare against external references)
    #[arg(long, default_value_t = false)]
    no_from_version: bool,

    /// Keep the baseline workspace after the run for incremental rebuilds
    #[arg(long, default_value_t = false)]
    keep_baseline: bool,

    /// Version control system holding the baseline revision
    #[arg(long, value_enum, default_value_t = VcsArg::Jj)]
    vcs: VcsArg,

    /// TOML operation catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Project to build and benchmark (defaults to the current directory)
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Results directory (overrides SIMBENCH_RESULTS_DIR)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Baseline workspace directory (overrides SIMBENCH_WORKSPACE_DIR)
    #[arg(long)]
    workspace_dir: Option<PathBuf>,

    /// Binary path relative to a built tree
    #[arg(long)]
    build_artifact: Option<PathBuf>,

    /// Show build output and debug logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command, killing it after `--secs` (exit 124 on timeout)
    #[command(hide = true)]
    Deadline {
        #[arg(long)]
        secs: u64,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Mcp,
    Cli,
    All,
}

impl From<ModeArg> for BenchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mcp => BenchMode::Mcp,
            ModeArg::Cli => BenchMode::Cli,
            ModeArg::All => BenchMode::All,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VcsArg {
    Jj,
    Git,
}

impl From<VcsArg> for VcsKind {
    fn from(vcs: VcsArg) -> Self {
        match vcs {
            VcsArg::Jj => VcsKind::Jj,
            VcsArg::Git => VcsKind::Git,
        }
    }
}

impl Args {
    /// Layer the flags over the environment-aware defaults.
    fn into_config(self) -> Result<RunConfig> {
        let defaults = RunConfig::default();
        let project_root = match self.project_root {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let project_root = std::fs::canonicalize(&project_root)
            .with_context(|| format!("Project root {} not found", project_root.display()))?;
        let launcher = std::env::current_exe().context("Failed to locate own executable")?;

        let mut build = defaults.build.clone();
        if let Some(artifact) = self.build_artifact {
            build.artifact = artifact;
        }
        build.verbose = self.verbose;

        Ok(RunConfig {
            swift_bin: self.swift_bin,
            node_server: self.node_server,
            idb: self.idb,
            warmup: self.warmup,
            min_runs: self.min_runs,
            tools: self.tools,
            udid: self.udid,
            mode: self.mode.into(),
            from_version: self.from_version,
            no_from_version: self.no_from_version,
            keep_baseline: self.keep_baseline,
            verbose: self.verbose,
            results_dir: self.results_dir.unwrap_or(defaults.results_dir),
            workspace_dir: self.workspace_dir.unwrap_or(defaults.workspace_dir),
            project_root,
            vcs: self.vcs.into(),
            build,
            launcher,
            catalog: self.catalog,
            ..defaults
        })
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_target(false)
        .init();
}

/// One labelled line per fatal error, plus remediation when known.
fn report_error(err: &BenchError) {
    eprintln!("error: {err}");
    if let Some(detail) = err.detail() {
        eprintln!("{detail}");
    }
    if let Some(hint) = err.recovery_suggestion() {
        eprintln!("hint: {hint}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The deadline wrapper runs inside measurements; keep its output clean.
    if let Some(Command::Deadline { secs, command }) = &args.command {
        let code = run_deadline(command, Duration::from_secs(*secs)).await?;
        std::process::exit(code);
    }

    init_tracing(args.verbose);
    let config = args.into_config()?;
    std::env::set_current_dir(&config.project_root).with_context(|| {
        format!("Failed to enter project root {}", config.project_root.display())
    })?;

    let baseline = if config.baseline_enabled() {
        config.from_version.as_str()
    } else {
        "none"
    };
    info!(mode = %config.mode, baseline, "Benchmark starting");

    let mut controller = RunController::new(config);
    match controller.run().await {
        Ok(outcome) => {
            info!(summary = %outcome.summary_path.display(), "Benchmark complete");
            Ok(())
        }
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_run_config() {
        let args = Args::try_parse_from(["simbench"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.warmup, 2);
        assert_eq!(args.min_runs, 5);
        assert!(matches!(args.mode, ModeArg::Cli));
        assert_eq!(args.from_version, "main");
        assert_eq!(args.swift_bin, None);
        assert_eq!(RunConfig::default().swift_bin, None);
    }

    #[test]
    fn test_repeated_tool_filter() {
        let args = Args::try_parse_from([
            "simbench", "--tool", "tap", "--tool", "view", "--mode", "all", "--vcs", "git",
        ])
        .unwrap();
        assert_eq!(args.tools, vec!["tap", "view"]);
        assert_eq!(BenchMode::from(args.mode), BenchMode::All);
        assert_eq!(VcsKind::from(args.vcs), VcsKind::Git);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Args::try_parse_from(["simbench", "--mode", "both"]).is_err());
    }

    #[test]
    fn test_deadline_subcommand() {
        let args =
            Args::try_parse_from(["simbench", "deadline", "--secs", "5", "--", "mcp", "call", "tap"])
                .unwrap();
        match args.command {
            Some(Command::Deadline { secs, command }) => {
                assert_eq!(secs, 5);
                assert_eq!(command, vec!["mcp", "call", "tap"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_into_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "simbench",
            "--no-from-version",
            "--keep-baseline",
            "--build-artifact",
            "out/app",
            "--results-dir",
            "/tmp/simbench-test-results",
            "--project-root",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert!(!config.baseline_enabled());
        assert!(config.keep_baseline);
        assert_eq!(config.build.artifact, PathBuf::from("out/app"));
        assert_eq!(config.results_dir, PathBuf::from("/tmp/simbench-test-results"));
        assert_eq!(config.project_root, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(config.build.program, "swift");
    }
}
