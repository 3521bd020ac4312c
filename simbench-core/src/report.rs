//! Result aggregation: N-way comparison tables and the run summary.
//!
//! Reads every structured artifact of a category in filename order. Column 0
//! is the primary; each further column is a reference matched by label, so a
//! reference dropped for one operation renders as `N/A` without shifting the
//! columns after it.

use crate::error::BenchResult;
use crate::invoker::Category;
use crate::measurement::{speedup, MeasurementResult};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const NOT_AVAILABLE: &str = "N/A";

/// A report column: header text plus the candidate labels it collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub header: String,
    pub labels: Vec<String>,
}

impl Column {
    /// Column matching exactly `label`, with a separate header.
    pub fn new(header: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            labels: vec![label.into()],
        }
    }

    /// Column collecting whichever of `labels` an operation used.
    pub fn any_of<I, S>(header: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A reference's mean and its speedup relative to the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCell {
    pub mean_secs: f64,
    pub speedup: Option<f64>,
}

/// One operation's row.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub operation: String,
    pub primary_mean: f64,
    /// One entry per reference column; `None` when that candidate was dropped.
    pub references: Vec<Option<ReferenceCell>>,
}

impl ComparisonRow {
    fn from_result(result: &MeasurementResult, reference_columns: &[Column]) -> Self {
        let primary_mean = result.primary().mean_secs;
        let references = reference_columns
            .iter()
            .map(|column| {
                result
                    .per_candidate
                    .iter()
                    .skip(1)
                    .find(|c| column.matches(&c.label))
                    .map(|c| ReferenceCell {
                        mean_secs: c.mean_secs,
                        speedup: speedup(primary_mean, c.mean_secs),
                    })
            })
            .collect();
        Self {
            operation: result.operation_name.clone(),
            primary_mean,
            references,
        }
    }
}

/// A human-readable per-operation report emitted by the measurement tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDetail {
    pub operation: String,
    pub markdown: String,
}

/// Read-only comparison view over one category's artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub category: Category,
    pub title: String,
    /// Column 0 is the primary.
    pub columns: Vec<Column>,
    pub rows: Vec<ComparisonRow>,
    pub details: Vec<OperationDetail>,
}

impl ComparisonReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.details.is_empty()
    }

    /// Markdown speedup table.
    pub fn render_table(&self) -> String {
        let mut header = vec!["Tool".to_string()];
        if let Some(primary) = self.columns.first() {
            header.push(format!("{} (mean)", primary.header));
        }
        for column in self.columns.iter().skip(1) {
            header.push(format!("{} (mean)", column.header));
            header.push("Speedup".to_string());
        }

        let mut out = String::new();
        let _ = writeln!(out, "| {} |", header.join(" | "));
        let _ = writeln!(out, "|{}|", vec!["------"; header.len()].join("|"));

        for row in &self.rows {
            let mut cells = vec![row.operation.clone(), format_secs(row.primary_mean)];
            for cell in &row.references {
                match cell {
                    Some(cell) => {
                        cells.push(format_secs(cell.mean_secs));
                        cells.push(
                            cell.speedup
                                .map_or_else(|| NOT_AVAILABLE.to_string(), |s| format!("{s:.2}x")),
                        );
                    }
                    None => {
                        cells.push(NOT_AVAILABLE.to_string());
                        cells.push(NOT_AVAILABLE.to_string());
                    }
                }
            }
            let _ = writeln!(out, "| {} |", cells.join(" | "));
        }
        out
    }

    /// Full category section: per-operation reports, then the table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);
        for detail in &self.details {
            let _ = writeln!(out, "## {}\n", detail.operation);
            let _ = writeln!(out, "{}\n", detail.markdown.trim_end());
        }
        if !self.rows.is_empty() {
            let _ = writeln!(out, "## {} Speedup Summary\n", self.category);
            out.push_str(&self.render_table());
            out.push('\n');
        }
        out
    }
}

fn format_secs(secs: f64) -> String {
    format!("{secs:.3}s")
}

/// Reads a results directory.
pub struct Aggregator {
    results_dir: PathBuf,
}

impl Aggregator {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Build the comparison for one category. `columns[0]` is the primary.
    pub fn aggregate(
        &self,
        category: Category,
        title: impl Into<String>,
        columns: Vec<Column>,
    ) -> BenchResult<ComparisonReport> {
        let reference_columns = columns.get(1..).unwrap_or_default();

        let mut rows = Vec::new();
        for (operation, path) in self.artifacts(category, "json")? {
            let result = MeasurementResult::read(&path, &operation)?;
            rows.push(ComparisonRow::from_result(&result, reference_columns));
        }

        let mut details = Vec::new();
        for (operation, path) in self.artifacts(category, "md")? {
            details.push(OperationDetail {
                operation,
                markdown: std::fs::read_to_string(&path)?,
            });
        }

        Ok(ComparisonReport {
            category,
            title: title.into(),
            columns,
            rows,
            details,
        })
    }

    /// `(operation, path)` for every artifact of `category` with `extension`,
    /// sorted by filename.
    fn artifacts(&self, category: Category, extension: &str) -> BenchResult<Vec<(String, PathBuf)>> {
        if !self.results_dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.results_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let Some(operation) = operation_name(&path, category) else {
                continue;
            };
            found.push((operation, path));
        }
        found.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()));
        Ok(found)
    }
}

fn operation_name(path: &Path, category: Category) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(category.prefix()))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Run metadata printed above the category sections.
#[derive(Debug, Clone)]
pub struct SummaryHeader {
    pub mode: String,
    pub primary: String,
    pub protocol_reference: Option<String>,
    pub external_tool: Option<String>,
    pub baseline_label: Option<String>,
    pub warmup: u32,
    pub min_runs: u32,
    pub date: DateTime<Local>,
}

/// Combined summary document over every non-empty category report.
pub fn render_summary(header: &SummaryHeader, reports: &[ComparisonReport]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# iOS Simulator MCP Benchmark\n");
    let _ = writeln!(out, "Date: {}\n", header.date.format("%a %b %e %H:%M:%S %Z %Y"));
    let _ = writeln!(out, "- Mode: `{}`", header.mode);
    let _ = writeln!(out, "- Swift: `{}`", header.primary);
    if let Some(node) = &header.protocol_reference {
        let _ = writeln!(out, "- Node: `{node}`");
    }
    if let Some(idb) = &header.external_tool {
        let _ = writeln!(out, "- idb: `{idb}`");
    }
    if let Some(label) = &header.baseline_label {
        let _ = writeln!(out, "- Self-comparison baseline: `{label}`");
    }
    let _ = writeln!(
        out,
        "- Warmup runs: {} | Min runs: {}\n",
        header.warmup, header.min_runs
    );

    for report in reports.iter().filter(|r| !r.is_empty()) {
        out.push_str(&report.render());
    }
    out
}
