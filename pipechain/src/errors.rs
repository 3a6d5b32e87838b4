//! Error types for pipeline orchestration.
//!
//! Only conditions that prevent a pipeline from being launched (or that make
//! the plumbing itself impossible) surface as [`PipelineError`]. Everything a
//! stage does wrong at runtime is reported as data in the
//! [`PipelineResult`](crate::pipeline::PipelineResult).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for pipechain operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline specification was rejected before launch.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The OS refused to create a pipe between two stages.
    #[error("Failed to create pipe after stage {after_stage}: {source}")]
    PipeCreation {
        /// Index of the stage whose output the pipe would have carried.
        after_stage: usize,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns true if this error was raised before any stage was launched.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Error raised when a pipeline specification is unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigurationError {
    /// Stable error code (e.g., "PIPELINE-001-EMPTY").
    pub code: &'static str,
    /// The error message.
    pub message: String,
    /// Index of the offending stage, if the error concerns one.
    pub stage: Option<usize>,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
            fix_hint: None,
        }
    }

    /// Sets the offending stage index.
    #[must_use]
    pub fn with_stage(mut self, index: usize) -> Self {
        self.stage = Some(index);
        self
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// The pipeline has no stages.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("PIPELINE-001-EMPTY", "Pipeline must contain at least one stage")
            .with_fix_hint("Add a producer stage before running the pipeline.")
    }

    /// A stage descriptor is malformed.
    #[must_use]
    pub fn invalid_stage(index: usize, message: impl Into<String>) -> Self {
        Self::new(
            "PIPELINE-002-STAGE",
            format!("Stage {index}: {}", message.into()),
        )
        .with_stage(index)
    }

    /// A timeout or limit has an unusable value.
    #[must_use]
    pub fn invalid_limit(name: &str, message: impl Into<String>) -> Self {
        Self::new(
            "PIPELINE-003-TIMEOUT",
            format!("Invalid {name}: {}", message.into()),
        )
    }

    /// The output sink cannot be used.
    #[must_use]
    pub fn sink_unusable(path: &Path, message: impl Into<String>) -> Self {
        Self::new(
            "PIPELINE-004-SINK",
            format!("Output sink '{}' cannot be used: {}", path.display(), message.into()),
        )
    }

    /// The output sink already exists and would be clobbered.
    #[must_use]
    pub fn sink_exists(path: &Path) -> Self {
        Self::sink_unusable(path, "file already exists")
            .with_fix_hint("Remove the existing file or choose another output path.")
    }

    /// The input source for the first stage cannot be opened.
    #[must_use]
    pub fn input_unusable(path: &Path, message: impl Into<String>) -> Self {
        Self::new(
            "PIPELINE-005-INPUT",
            format!("Input '{}' cannot be opened: {}", path.display(), message.into()),
        )
    }

    /// A serialized specification could not be parsed.
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(
            "PIPELINE-006-FORMAT",
            format!("Malformed pipeline specification: {}", message.into()),
        )
    }
}

/// Non-fatal failure to remove a partially written output file.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Failed to clean up '{}': {message}", path.display())]
pub struct CleanupError {
    /// The file that could not be removed or flushed.
    pub path: PathBuf,
    /// The OS error message.
    pub message: String,
}

impl CleanupError {
    /// Creates a new cleanup error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for pipechain operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
