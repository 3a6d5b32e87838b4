//! Typed lifecycle events emitted during a pipeline run.

use crate::core::ExitClass;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A lifecycle event of one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The pipeline passed validation and is about to launch its stages.
    PipelineStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Pipeline name.
        name: String,
        /// Number of stages.
        stage_count: usize,
        /// Shell-style rendering of the pipeline.
        command_line: String,
    },
    /// A stage process was spawned.
    StageSpawned {
        /// Run identifier.
        run_id: Uuid,
        /// Stage index.
        stage_index: usize,
        /// Stage name.
        stage_name: String,
        /// OS process id.
        pid: Option<u32>,
    },
    /// A stage process could not be spawned.
    StageLaunchFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Stage index.
        stage_index: usize,
        /// Stage name.
        stage_name: String,
        /// OS error text.
        error: String,
    },
    /// The orchestrator is stopping a running stage.
    StageTerminating {
        /// Run identifier.
        run_id: Uuid,
        /// Stage index.
        stage_index: usize,
        /// Why the stage is being stopped.
        reason: String,
    },
    /// A stage's outcome is known.
    StageFinished {
        /// Run identifier.
        run_id: Uuid,
        /// Stage index.
        stage_index: usize,
        /// How it ended.
        exit_class: ExitClass,
        /// Wall-clock duration in milliseconds.
        duration_ms: f64,
    },
    /// Every still-running stage is being stopped.
    PipelineCancelled {
        /// Run identifier.
        run_id: Uuid,
        /// Why.
        reason: String,
    },
    /// A partially written output file was deleted.
    SinkRemoved {
        /// Run identifier.
        run_id: Uuid,
        /// The deleted file.
        path: PathBuf,
    },
    /// The output file could not be finalized or removed.
    CleanupFailed {
        /// Run identifier.
        run_id: Uuid,
        /// The file concerned.
        path: PathBuf,
        /// OS error text.
        error: String,
    },
    /// The pipeline result is final.
    PipelineFinished {
        /// Run identifier.
        run_id: Uuid,
        /// Overall verdict.
        success: bool,
        /// Index of the root-cause stage, if any.
        primary_failure: Option<usize>,
        /// Wall-clock duration in milliseconds.
        duration_ms: f64,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type (e.g., "stage.spawned").
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline.started",
            Self::StageSpawned { .. } => "stage.spawned",
            Self::StageLaunchFailed { .. } => "stage.launch_failed",
            Self::StageTerminating { .. } => "stage.terminating",
            Self::StageFinished { .. } => "stage.finished",
            Self::PipelineCancelled { .. } => "pipeline.cancelled",
            Self::SinkRemoved { .. } => "sink.removed",
            Self::CleanupFailed { .. } => "sink.cleanup_failed",
            Self::PipelineFinished { .. } => "pipeline.finished",
        }
    }

    /// Returns the run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::PipelineStarted { run_id, .. }
            | Self::StageSpawned { run_id, .. }
            | Self::StageLaunchFailed { run_id, .. }
            | Self::StageTerminating { run_id, .. }
            | Self::StageFinished { run_id, .. }
            | Self::PipelineCancelled { run_id, .. }
            | Self::SinkRemoved { run_id, .. }
            | Self::CleanupFailed { run_id, .. }
            | Self::PipelineFinished { run_id, .. } => *run_id,
        }
    }
}
