//! Structured results emitted by the measurement tool.
//!
//! The tool (hyperfine) exports `{"results": [{"command": ..., "mean": ...}]}`
//! in the order the commands were given, so position 0 is always the primary.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One command's timing as exported by the measurement tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedCommand {
    /// Command name given to the tool (`"<label>: <operation>"`).
    pub command: String,
    /// Mean wall-clock duration in seconds.
    pub mean: f64,
}

/// Top-level shape of the tool's JSON export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRun {
    pub results: Vec<ExportedCommand>,
}

/// Per-candidate mean for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMean {
    pub label: String,
    pub mean_secs: f64,
}

/// Ordered measurements of one operation; index 0 is the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub operation_name: String,
    pub per_candidate: Vec<CandidateMean>,
}

/// Command name handed to the measurement tool for a candidate.
pub fn command_name(label: &str, operation: &str) -> String {
    format!("{label}: {operation}")
}

impl MeasurementResult {
    /// Read a JSON export for `operation_name`.
    pub fn read(path: &Path, operation_name: &str) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, operation_name)
    }

    /// Parse a JSON export. Labels are recovered from the command names.
    pub fn parse(json: &str, operation_name: &str) -> BenchResult<Self> {
        let run: ExportedRun = serde_json::from_str(json)?;
        if run.results.is_empty() {
            return Err(BenchError::measurement(
                operation_name,
                "export contains no results",
            ));
        }
        let suffix = format!(": {operation_name}");
        let per_candidate = run
            .results
            .into_iter()
            .map(|r| CandidateMean {
                label: r
                    .command
                    .strip_suffix(&suffix)
                    .unwrap_or(&r.command)
                    .to_string(),
                mean_secs: r.mean,
            })
            .collect();
        Ok(Self {
            operation_name: operation_name.to_string(),
            per_candidate,
        })
    }

    pub fn primary(&self) -> &CandidateMean {
        &self.per_candidate[0]
    }

    /// Mean of the reference with `label`, never the primary.
    pub fn reference_mean(&self, label: &str) -> Option<f64> {
        self.per_candidate
            .iter()
            .skip(1)
            .find(|c| c.label == label)
            .map(|c| c.mean_secs)
    }
}

/// `reference / primary`; above 1.0 means the primary is faster.
///
/// `None` when the primary mean is not a positive number.
pub fn speedup(primary_mean: f64, reference_mean: f64) -> Option<f64> {
    (primary_mean > 0.0 && reference_mean.is_finite()).then(|| reference_mean / primary_mean)
}
