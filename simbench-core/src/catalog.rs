//! Operation catalog: which operations each benchmark category runs.
//!
//! The built-in catalog covers the simulator server's tools; a TOML file can
//! replace it:
//!
//! ```toml
//! [[mcp]]
//! name = "tap"
//! params = { x = 165, y = 269 }
//!
//! [[cli]]
//! name = "screenshot"
//! subcommand = "view"
//! external = "xcrun simctl io {udid} screenshot --type=png /tmp/bench_ss.png"
//! external_label = "simctl"
//! ```

use crate::error::{BenchError, BenchResult};
use crate::params::Operation;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// A direct-invocation operation: the primary's subcommand plus the command
/// line of the external tool it is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectOperation {
    #[serde(flatten)]
    pub operation: Operation,
    /// Primary subcommand; defaults to the operation name.
    #[serde(default)]
    pub subcommand: Option<String>,
    /// External command template with `{udid}` and `{idb}` placeholders.
    pub external: String,
    /// Column label for the external tool (e.g. `idb`, `simctl`).
    pub external_label: String,
}

impl DirectOperation {
    pub fn new(
        operation: Operation,
        external_label: impl Into<String>,
        external: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            subcommand: None,
            external: external.into(),
            external_label: external_label.into(),
        }
    }

    pub fn with_subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.operation.name
    }

    pub fn subcommand(&self) -> &str {
        self.subcommand.as_deref().unwrap_or(&self.operation.name)
    }
}

/// Operations per category, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub mcp: Vec<Operation>,
    #[serde(default)]
    pub cli: Vec<DirectOperation>,
}

impl Catalog {
    /// The simulator server's benchmarkable tools.
    pub fn builtin() -> Self {
        let mcp = vec![
            Operation::new("get_booted_sim_id").without_target(),
            Operation::new("describe_all"),
            Operation::new("describe_point")
                .with_param("x", 165)
                .with_param("y", 269),
            Operation::new("tap").with_param("x", 165).with_param("y", 269),
            Operation::new("view"),
        ];

        let cli = vec![
            DirectOperation::new(
                Operation::new("describe_all"),
                "idb",
                "{idb} ui describe-all --udid {udid} --json",
            ),
            DirectOperation::new(
                Operation::new("describe_point")
                    .with_param("x", 165)
                    .with_param("y", 269),
                "idb",
                "{idb} ui describe-point --udid {udid} --json -- 165 269",
            ),
            DirectOperation::new(
                Operation::new("tap").with_param("x", 165).with_param("y", 269),
                "idb",
                "{idb} ui tap --udid {udid} --json -- 165 269",
            ),
            DirectOperation::new(
                Operation::new("screenshot"),
                "simctl",
                "xcrun simctl io {udid} screenshot --type=png /tmp/bench_ss.png",
            )
            .with_subcommand("view"),
        ];

        Self { mcp, cli }
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse a TOML catalog, rejecting duplicate names within a category.
    pub fn parse(text: &str) -> BenchResult<Self> {
        let catalog: Catalog = toml::from_str(text)?;
        check_unique("mcp", catalog.mcp.iter().map(|op| op.name.as_str()))?;
        check_unique("cli", catalog.cli.iter().map(|op| op.name()))?;
        Ok(catalog)
    }

    /// Keep only the named operations, preserving declaration order.
    ///
    /// An empty filter keeps everything.
    pub fn filtered(&self, names: &[String]) -> Self {
        if names.is_empty() {
            return self.clone();
        }
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Self {
            mcp: self
                .mcp
                .iter()
                .filter(|op| wanted.contains(op.name.as_str()))
                .cloned()
                .collect(),
            cli: self
                .cli
                .iter()
                .filter(|op| wanted.contains(op.name()))
                .cloned()
                .collect(),
        }
    }

    pub fn mcp_names(&self) -> Vec<&str> {
        self.mcp.iter().map(|op| op.name.as_str()).collect()
    }

    pub fn cli_names(&self) -> Vec<&str> {
        self.cli.iter().map(|op| op.name()).collect()
    }

    /// Distinct external labels of the direct operations, in first-seen order.
    pub fn cli_external_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for op in &self.cli {
            if !labels.contains(&op.external_label.as_str()) {
                labels.push(&op.external_label);
            }
        }
        labels
    }
}

fn check_unique<'a>(category: &str, names: impl Iterator<Item = &'a str>) -> BenchResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(BenchError::catalog(format!("empty {category} operation name")));
        }
        if !seen.insert(name) {
            return Err(BenchError::catalog(format!(
                "duplicate {category} operation '{name}'"
            )));
        }
    }
    Ok(())
}
