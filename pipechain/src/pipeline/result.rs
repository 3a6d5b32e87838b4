//! Aggregated result of one pipeline run.

use crate::errors::CleanupError;
use crate::stages::StageOutcome;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run identifier, also present on every log line and event of the run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub name: String,
    /// True iff no stage had a fault.
    pub success: bool,
    /// One outcome per stage, in stage order.
    pub outcomes: Vec<StageOutcome>,
    /// The outcome to surface first on failure.
    pub primary_failure: Option<StageOutcome>,
    /// False if the output file could not be flushed or removed.
    pub sink_finalized: bool,
    /// Problems finalizing or removing the output file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<CleanupError>,
    /// Wall-clock duration of the whole run in milliseconds.
    pub duration_ms: f64,
}

impl PipelineResult {
    /// Returns the outcomes classified as collateral.
    pub fn collateral(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| o.collateral)
    }

    /// Returns the outcomes classified as faults.
    pub fn faults(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| o.is_fault())
    }

    /// Returns the outcome of the stage at `index`.
    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&StageOutcome> {
        self.outcomes.get(index)
    }

    /// Human-readable report: the primary failure and its diagnostics first,
    /// then the other faults, then collateral outcomes marked as secondary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.success {
            let _ = writeln!(
                out,
                "pipeline '{}' succeeded ({} stages, {:.0} ms)",
                self.name,
                self.outcomes.len(),
                self.duration_ms
            );
        } else {
            let _ = writeln!(out, "pipeline '{}' failed", self.name);
        }

        if let Some(ref primary) = self.primary_failure {
            let _ = writeln!(
                out,
                "  stage {} ({}): {}",
                primary.stage_index, primary.stage_name, primary.exit_class
            );
            for line in primary.diagnostics.lines() {
                let _ = writeln!(out, "    | {line}");
            }
        }

        let primary_index = self.primary_failure.as_ref().map(|p| p.stage_index);
        for fault in self.faults().filter(|o| Some(o.stage_index) != primary_index) {
            let _ = writeln!(
                out,
                "  stage {} ({}): {}",
                fault.stage_index, fault.stage_name, fault.exit_class
            );
        }
        for outcome in self.collateral() {
            let _ = writeln!(
                out,
                "  stage {} ({}): {} [secondary]",
                outcome.stage_index, outcome.stage_name, outcome.exit_class
            );
        }
        for error in &self.cleanup_errors {
            let _ = writeln!(out, "  cleanup: {error}");
        }

        out.trim_end().to_string()
    }
}
