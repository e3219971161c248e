//! Report generation for scenario results.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::runner::ScenarioResult;
use crate::structured_log::now_utc;

/// Render results as `NAME, PASSED|FAILED` lines, one per scenario.
#[must_use]
pub fn render_results(results: &[ScenarioResult]) -> String {
    let mut out = String::new();
    for r in results {
        let status = if r.passed { "PASSED" } else { "FAILED" };
        out.push_str(&format!("{}, {status}\n", r.name));
    }
    out
}

/// Write the results file, replacing any previous one.
pub fn write_results(path: &Path, results: &[ScenarioResult]) -> std::io::Result<()> {
    std::fs::write(path, render_results(results))
}

/// Machine-readable summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub family: String,
    pub version: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ScenarioResult>,
    /// Core I/O counters at the end of the run.
    pub metrics: BTreeMap<String, u64>,
}

impl RunSummary {
    #[must_use]
    pub fn new(family: &str, version: &str, results: Vec<ScenarioResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let metrics = prepio_core::global_metrics()
            .snapshot()
            .fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self {
            family: family.to_string(),
            version: version.to_string(),
            timestamp: now_utc(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
            metrics,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Render the summary as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Render the summary as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {} ({})\n\n", self.family, self.version));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.total));
        out.push_str(&format!("- Passed: {}\n", self.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.failed));

        out.push_str("| Scenario | Status | Detail |\n");
        out.push_str("|----------|--------|--------|\n");
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            let detail = match (&r.failed_step, &r.detail) {
                (Some(step), Some(detail)) => format!("step {step}: {detail}"),
                _ => String::new(),
            };
            out.push_str(&format!("| {} | {status} | {detail} |\n", r.name));
        }
        out
    }
}
