//! Typed outcome reported for every stage of a pipeline run.

use crate::core::{ExitClass, StageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How one stage's run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Position of the stage in the pipeline (0 is the producer).
    pub stage_index: usize,
    /// Stage display name.
    pub stage_name: String,
    /// Stage role.
    pub role: StageRole,
    /// How the process ended.
    pub exit_class: ExitClass,
    /// Captured diagnostic text (empty unless the stage captures diagnostics).
    #[serde(default)]
    pub diagnostics: String,
    /// Bytes of diagnostics dropped because the capture buffer was full.
    #[serde(default)]
    pub diagnostics_dropped: u64,
    /// Secondary problems observed while supervising the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Whether the failure was classified as a symptom of another stage's failure.
    #[serde(default)]
    pub collateral: bool,
    /// OS process id, when the stage was launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// When the stage was launched (or would have been).
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl StageOutcome {
    /// Creates an outcome with no diagnostics and zero duration.
    #[must_use]
    pub fn new(
        stage_index: usize,
        stage_name: impl Into<String>,
        role: StageRole,
        exit_class: ExitClass,
    ) -> Self {
        Self {
            stage_index,
            stage_name: stage_name.into(),
            role,
            exit_class,
            diagnostics: String::new(),
            diagnostics_dropped: 0,
            notes: Vec::new(),
            collateral: false,
            pid: None,
            started_at: Utc::now(),
            duration_ms: 0.0,
        }
    }

    /// Sets the diagnostic text.
    #[must_use]
    pub fn with_diagnostics(mut self, text: impl Into<String>) -> Self {
        self.diagnostics = text.into();
        self
    }

    /// Adds a supervision note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Sets the process id.
    #[must_use]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Sets the timing.
    #[must_use]
    pub fn with_timing(mut self, started_at: DateTime<Utc>, elapsed: Duration) -> Self {
        self.started_at = started_at;
        self.duration_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    /// Returns the wall-clock duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_ms.max(0.0) / 1000.0)
    }

    /// Returns true if the stage exited cleanly.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_class.is_success()
    }

    /// Returns true if the stage failed for its own reasons (not collateral).
    #[must_use]
    pub fn is_fault(&self) -> bool {
        !self.is_success() && !self.collateral
    }
}
