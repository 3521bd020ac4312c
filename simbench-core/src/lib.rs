//! Simulator MCP benchmark orchestration
//!
//! Compares a locally built binary against its own previous revision and
//! against external reference tools, operation by operation:
//!
//! - `workspace` stages an isolated checkout of the baseline revision and
//!   reuses it across runs to keep the incremental build cache
//! - `build` builds the current tree and the baseline concurrently
//! - `command` turns an operation into a deadline-wrapped shell invocation
//! - `invoker` smoke-tests candidates and runs the measurement tool
//! - `report` renders N-way comparison tables with speedups
//! - `controller` sequences all of the above and owns cleanup
//!
//! # Usage
//!
//! ```bash
//! # Swift CLI vs idb, self-compared against `main`
//! simbench
//!
//! # Both categories, only `tap`, no self-comparison
//! simbench --mode all --tool tap --no-from-version
//! ```

pub mod build;
pub mod catalog;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod invoker;
pub mod measurement;
pub mod params;
pub mod prerequisites;
pub mod process;
pub mod report;
pub mod state_machine;
pub mod vcs;
pub mod workspace;

pub use build::{BuildArtifact, BuildCoordinator, BuildSpec};
pub use catalog::{Catalog, DirectOperation};
pub use command::{CommandBuilder, DeadlineWrapper, Invocation};
pub use config::{BenchMode, RunConfig, VcsKind};
pub use controller::{RunController, RunOutcome};
pub use error::{BenchError, BenchResult};
pub use invoker::{Candidate, CandidateKind, Category, MeasurementInvoker, MeasurementTool};
pub use measurement::{speedup, MeasurementResult};
pub use params::{Operation, ParamValue, Params};
pub use report::{Aggregator, Column, ComparisonReport};
pub use state_machine::{RunState, StateMachine};
pub use vcs::{RevisionRef, VersionControl};
pub use workspace::{BaselineWorkspaceManager, Workspace};
