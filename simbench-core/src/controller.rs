//! Run controller: sequences staging, builds, smoke tests, measurement and
//! reporting, and owns the failure and cleanup policy.
//!
//! Candidate-scoped failures degrade the comparison; anything else aborts the
//! run. Once the baseline workspace is staged it is torn down on every exit
//! path unless the operator asked to keep it.

use crate::build::{BuildCoordinator, BuildSet};
use crate::catalog::{Catalog, DirectOperation};
use crate::command::{CommandBuilder, DeadlineWrapper, Invocation};
use crate::config::{RunConfig, VcsKind};
use crate::error::BenchResult;
use crate::invoker::{Candidate, CandidateKind, Category, MeasurementInvoker, MeasurementTool};
use crate::params::Operation;
use crate::prerequisites::{check_tools, resolve_device};
use crate::process::run_program;
use crate::report::{render_summary, Aggregator, Column, ComparisonReport, SummaryHeader};
use crate::state_machine::{RunState, StateMachine};
use crate::vcs::git::GitVcs;
use crate::vcs::jj::JujutsuVcs;
use crate::vcs::{RevisionRef, VersionControl};
use crate::workspace::{BaselineWorkspaceManager, Workspace};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SUMMARY_FILE: &str = "summary.md";
const IDB_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// External template used to smoke-test idb before the run.
const IDB_SMOKE_TEMPLATE: &str = "{idb} ui tap --udid {udid} --json -- 0 0";

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary_path: PathBuf,
    pub reports: Vec<ComparisonReport>,
    pub baseline: Option<RevisionRef>,
}

/// The self-baseline binary and the revision it was built from.
struct BaselineBinary {
    binary: PathBuf,
    revision: RevisionRef,
    label: String,
}

/// Per-run facts settled before measurement starts.
struct RunPlan {
    catalog: Catalog,
    builder: CommandBuilder,
    primary_bin: PathBuf,
    baseline: Option<BaselineBinary>,
    /// Reference server command, if it survived the up-front checks.
    node_server: Option<String>,
    /// External tool path, if it survived the up-front checks.
    idb: Option<PathBuf>,
}

impl RunPlan {
    fn baseline_label(&self) -> Option<&str> {
        self.baseline.as_ref().map(|b| b.label.as_str())
    }
}

pub struct RunController {
    config: RunConfig,
    vcs: Arc<dyn VersionControl>,
    machine: StateMachine,
}

impl RunController {
    /// Controller using the configured version-control backend.
    pub fn new(config: RunConfig) -> Self {
        let vcs: Arc<dyn VersionControl> = match config.vcs {
            VcsKind::Jj => Arc::new(JujutsuVcs::new(&config.project_root)),
            VcsKind::Git => Arc::new(GitVcs::new(&config.project_root)),
        };
        Self::with_vcs(config, vcs)
    }

    pub fn with_vcs(config: RunConfig, vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            config,
            vcs,
            machine: StateMachine::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.machine.current()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Execute the whole run.
    pub async fn run(&mut self) -> BenchResult<RunOutcome> {
        let manager = self.config.baseline_enabled().then(|| {
            BaselineWorkspaceManager::new(
                Arc::clone(&self.vcs),
                self.config.workspace_dir.clone(),
                self.config.workspace_name.clone(),
            )
        });

        let result = self.execute(manager.as_ref()).await;
        if let Err(e) = &result {
            if !self.machine.is_terminal() {
                let _ = self.machine.abort(&e.to_string());
            }
        }

        if let Some(manager) = &manager {
            if self.machine.visited(RunState::BaselineStaged) {
                if self.config.keep_baseline {
                    info!(
                        dir = %manager.dir().display(),
                        "Baseline workspace preserved for incremental builds"
                    );
                } else if let Err(e) = manager.teardown().await {
                    warn!("Failed to clean up baseline workspace: {e}");
                }
            }
        }

        info!("{}", self.machine.summary());
        result
    }

    async fn execute(
        &mut self,
        manager: Option<&BaselineWorkspaceManager>,
    ) -> BenchResult<RunOutcome> {
        let catalog = self.config.validate()?;
        let vcs_program = self.vcs.program();
        check_tools(&self.config.required_tools(vcs_program))?;
        let udid = resolve_device(self.config.udid.as_deref()).await?;
        info!(udid = %udid, "Using simulator");
        self.machine.advance(RunState::PrerequisitesChecked, None)?;

        let workspace = match manager {
            Some(manager) => {
                let revision = manager.resolve(&self.config.from_version).await?;
                let workspace = manager.stage(&revision).await?;
                self.machine
                    .advance(RunState::BaselineStaged, Some(&revision.display_label()))?;
                Some(workspace)
            }
            None => None,
        };

        let builds = self.build(workspace.as_ref()).await?;
        self.machine.advance(RunState::Built, None)?;

        let plan = self.plan(catalog, udid, &builds, workspace.as_ref()).await?;
        self.machine.advance(RunState::SmokeTested, None)?;

        self.reset_results_dir()?;
        self.machine.advance(RunState::Measuring, None)?;
        let invoker = self.invoker();
        if self.config.mode.includes_mcp() {
            for op in &plan.catalog.mcp {
                let candidates = self.mcp_candidates(&plan, op)?;
                invoker.measure(Category::Mcp, &op.name, candidates).await?;
            }
        }
        if self.config.mode.includes_cli() {
            for op in &plan.catalog.cli {
                let candidates = self.cli_candidates(&plan, op)?;
                invoker.measure(Category::Cli, op.name(), candidates).await?;
            }
        }

        self.machine.advance(RunState::Reporting, None)?;
        let outcome = self.report(&plan)?;
        self.machine.advance(RunState::Done, None)?;
        Ok(outcome)
    }

    async fn build(&self, workspace: Option<&Workspace>) -> BenchResult<BuildSet> {
        let mut spec = self.config.build.clone();
        spec.verbose |= self.config.verbose;
        BuildCoordinator::new(spec)
            .build(&self.config.project_root, workspace.map(|w| w.dir.as_path()))
            .await
    }

    fn invoker(&self) -> MeasurementInvoker {
        MeasurementInvoker::new(
            MeasurementTool {
                program: self.config.hyperfine.clone(),
                warmup: self.config.warmup,
                min_runs: self.config.min_runs,
                timeout: self.config.measurement_timeout,
            },
            self.config.results_dir.clone(),
            self.config.smoke_timeout,
        )
    }

    /// Check reference availability and smoke-test every category's primary.
    async fn plan(
        &self,
        catalog: Catalog,
        udid: String,
        builds: &BuildSet,
        workspace: Option<&Workspace>,
    ) -> BenchResult<RunPlan> {
        let wrapper = DeadlineWrapper::new(&self.config.launcher, self.config.invocation_timeout);
        let builder = CommandBuilder::new(udid, &self.config.mcp_client, wrapper);
        let baseline = match (&builds.baseline, workspace) {
            (Some(artifact), Some(workspace)) => Some(BaselineBinary {
                binary: artifact.binary_path.clone(),
                revision: workspace.revision.clone(),
                label: workspace.revision.display_label(),
            }),
            _ => None,
        };

        let mut plan = RunPlan {
            catalog,
            builder,
            primary_bin: self.config.primary_binary(&builds.current.binary_path),
            baseline,
            node_server: None,
            idb: None,
        };
        let invoker = self.invoker();

        if self.config.mode.includes_mcp() {
            let smoke_op = Operation::new("get_booted_sim_id").without_target();
            let server = CommandBuilder::server_command(&plan.primary_bin);
            let primary = Candidate::new(
                mcp_primary_label(plan.baseline_label()),
                CandidateKind::Primary,
                plan.builder.protocol_invocation(&smoke_op, &server)?,
            );
            info!("Smoke testing {} server", primary.label);
            invoker.smoke_test(&primary).await?;

            plan.node_server = match self.config.node_script() {
                Some(script) if script.exists() => {
                    let node = Candidate::new(
                        NODE_LABEL,
                        CandidateKind::External,
                        plan.builder
                            .protocol_invocation(&smoke_op, &self.config.node_server)?,
                    );
                    match invoker.smoke_test(&node).await {
                        Ok(()) => Some(self.config.node_server.clone()),
                        Err(e) => {
                            warn!("{e}; MCP benchmarks will run without {NODE_LABEL}");
                            None
                        }
                    }
                }
                script => {
                    let location = script
                        .map_or_else(|| self.config.node_server.clone(), |s| s.display().to_string());
                    warn!("Node server not found at {location}; MCP benchmarks will run without it");
                    None
                }
            };
        }

        if self.config.mode.includes_cli() {
            let smoke_op = Operation::new("tap").with_param("x", 0).with_param("y", 0);
            let primary = Candidate::new(
                cli_primary_label(plan.baseline_label()),
                CandidateKind::Primary,
                plan.builder.direct_invocation(&smoke_op, &plan.primary_bin, "tap")?,
            );
            info!("Smoke testing {}", primary.label);
            invoker.smoke_test(&primary).await?;

            let idb = self.config.resolve(&self.config.idb);
            plan.idb = if idb.exists() {
                self.idb_connect(&idb, plan.builder.target_id()).await;
                let candidate = Candidate::new(
                    "idb",
                    CandidateKind::External,
                    plan.builder.external_invocation(&smoke_op, IDB_SMOKE_TEMPLATE, &idb)?,
                );
                match invoker.smoke_test(&candidate).await {
                    Ok(()) => Some(idb),
                    Err(e) => {
                        warn!("{e}; CLI benchmarks will run without idb");
                        None
                    }
                }
            } else {
                warn!(
                    "idb not found at {}; CLI benchmarks will run without it",
                    idb.display()
                );
                None
            };
        }

        Ok(plan)
    }

    /// Start the idb companion so measurements exclude its startup.
    async fn idb_connect(&self, idb: &Path, udid: &str) {
        info!("Connecting idb companion");
        match run_program(&idb.display().to_string(), ["connect", udid], None, IDB_CONNECT_TIMEOUT)
            .await
        {
            Ok(outcome) if outcome.success() => info!("idb companion connected"),
            Ok(outcome) => warn!(
                "idb connect failed: {}",
                outcome.failure_message(IDB_CONNECT_TIMEOUT)
            ),
            Err(e) => warn!("idb connect failed: {e}"),
        }
    }

    fn reset_results_dir(&self) -> BenchResult<()> {
        let dir = &self.config.results_dir;
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        Ok(())
    }

    fn mcp_candidates(&self, plan: &RunPlan, op: &Operation) -> BenchResult<Vec<Candidate>> {
        let server = CommandBuilder::server_command(&plan.primary_bin);
        let mut candidates = vec![Candidate::new(
            mcp_primary_label(plan.baseline_label()),
            CandidateKind::Primary,
            plan.builder.protocol_invocation(op, &server)?,
        )];
        if let Some(baseline) = &plan.baseline {
            let server = CommandBuilder::server_command(&baseline.binary);
            candidates.push(Candidate::new(
                format!("swift ({})", baseline.label),
                CandidateKind::SelfBaseline,
                plan.builder.protocol_invocation(op, &server)?,
            ));
        }
        if let Some(node) = &plan.node_server {
            candidates.push(Candidate::new(
                NODE_LABEL,
                CandidateKind::External,
                plan.builder.protocol_invocation(op, node)?,
            ));
        }
        Ok(candidates)
    }

    fn cli_candidates(&self, plan: &RunPlan, op: &DirectOperation) -> BenchResult<Vec<Candidate>> {
        let direct = |binary: &Path| -> BenchResult<Invocation> {
            plan.builder
                .direct_invocation(&op.operation, binary, op.subcommand())
        };
        let mut candidates = vec![Candidate::new(
            cli_primary_label(plan.baseline_label()),
            CandidateKind::Primary,
            direct(&plan.primary_bin)?,
        )];
        if let Some(baseline) = &plan.baseline {
            candidates.push(Candidate::new(
                format!("swift-cli ({})", baseline.label),
                CandidateKind::SelfBaseline,
                direct(&baseline.binary)?,
            ));
        }

        if op.external.contains("{idb}") && plan.idb.is_none() {
            warn!("idb unavailable; benchmarking '{}' without it", op.name());
        } else {
            let idb = plan
                .idb
                .clone()
                .unwrap_or_else(|| self.config.resolve(&self.config.idb));
            candidates.push(Candidate::new(
                op.external_label.clone(),
                CandidateKind::External,
                plan.builder
                    .external_invocation(&op.operation, &op.external, &idb)?,
            ));
        }
        Ok(candidates)
    }

    fn report(&self, plan: &RunPlan) -> BenchResult<RunOutcome> {
        let aggregator = Aggregator::new(&self.config.results_dir);
        let baseline_label = plan.baseline_label();
        let mut reports = Vec::new();

        if self.config.mode.includes_mcp() {
            let (title, columns) = mcp_columns(baseline_label);
            reports.push(aggregator.aggregate(Category::Mcp, title, columns)?);
        }
        if self.config.mode.includes_cli() {
            let (title, columns) = cli_columns(baseline_label, &plan.catalog.cli_external_labels());
            reports.push(aggregator.aggregate(Category::Cli, title, columns)?);
        }

        let header = SummaryHeader {
            mode: self.config.mode.to_string(),
            primary: plan.primary_bin.display().to_string(),
            protocol_reference: self
                .config
                .mode
                .includes_mcp()
                .then(|| self.config.node_server.clone()),
            external_tool: self
                .config
                .mode
                .includes_cli()
                .then(|| self.config.idb.display().to_string()),
            baseline_label: baseline_label.map(String::from),
            warmup: self.config.warmup,
            min_runs: self.config.min_runs,
            date: Local::now(),
        };
        let summary_path = self.config.results_dir.join(SUMMARY_FILE);
        std::fs::write(&summary_path, render_summary(&header, &reports))?;

        info!(dir = %self.config.results_dir.display(), "Results saved");
        info!(path = %summary_path.display(), "Summary written");

        Ok(RunOutcome {
            summary_path,
            reports,
            baseline: plan.baseline.as_ref().map(|b| b.revision.clone()),
        })
    }
}

const NODE_LABEL: &str = "node";

fn mcp_primary_label(baseline: Option<&str>) -> String {
    match baseline {
        Some(_) => "swift (current)".to_string(),
        None => "swift".to_string(),
    }
}

fn cli_primary_label(baseline: Option<&str>) -> String {
    match baseline {
        Some(_) => "swift-cli (current)".to_string(),
        None => "swift-cli".to_string(),
    }
}

/// Title and columns of the protocol-level report.
fn mcp_columns(baseline: Option<&str>) -> (String, Vec<Column>) {
    let primary = mcp_primary_label(baseline);
    match baseline {
        Some(label) => (
            format!("MCP Benchmark (Swift current vs {label} vs Node)"),
            vec![
                Column::new("Swift (current)", primary),
                Column::new(format!("Swift ({label})"), format!("swift ({label})")),
                Column::new("Node", NODE_LABEL),
            ],
        ),
        None => (
            "MCP Benchmark (Swift MCP vs Node MCP)".to_string(),
            vec![Column::new("Swift", primary), Column::new("Node", NODE_LABEL)],
        ),
    }
}

/// Title and columns of the direct-invocation report. All external tools
/// share one column.
fn cli_columns(baseline: Option<&str>, external_labels: &[&str]) -> (String, Vec<Column>) {
    let primary = cli_primary_label(baseline);
    let external_header = external_labels.join(" / ");
    let external = Column::any_of(external_header.clone(), external_labels.iter().copied());
    match baseline {
        Some(label) => (
            format!("CLI Benchmark (Swift current vs {label} vs {external_header})"),
            vec![
                Column::new("Swift CLI (current)", primary),
                Column::new(format!("Swift CLI ({label})"), format!("swift-cli ({label})")),
                external,
            ],
        ),
        None => (
            format!("CLI Benchmark (Swift CLI vs {external_header})"),
            vec![Column::new("Swift CLI", primary), external],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp_columns_with_baseline() {
        let (title, columns) = mcp_columns(Some("qpvuntsm: Fix tap"));
        assert_eq!(title, "MCP Benchmark (Swift current vs qpvuntsm: Fix tap vs Node)");
        let headers: Vec<&str> = columns.iter().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, vec!["Swift (current)", "Swift (qpvuntsm: Fix tap)", "Node"]);
        assert_eq!(columns[1].labels, vec!["swift (qpvuntsm: Fix tap)"]);
    }

    #[test]
    fn test_mcp_columns_without_baseline() {
        let (title, columns) = mcp_columns(None);
        assert_eq!(title, "MCP Benchmark (Swift MCP vs Node MCP)");
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].labels, vec!["swift"]);
    }

    #[test]
    fn test_cli_columns_share_external_column() {
        let (title, columns) = cli_columns(None, &["idb", "simctl"]);
        assert_eq!(title, "CLI Benchmark (Swift CLI vs idb / simctl)");
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].header, "idb / simctl");
        assert_eq!(columns[1].labels, vec!["idb", "simctl"]);
    }

    #[test]
    fn test_primary_labels() {
        assert_eq!(mcp_primary_label(None), "swift");
        assert_eq!(mcp_primary_label(Some("x")), "swift (current)");
        assert_eq!(cli_primary_label(Some("x")), "swift-cli (current)");
    }
}
