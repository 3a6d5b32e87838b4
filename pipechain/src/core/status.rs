//! Stage role, diagnostics policy and exit classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;

/// What a stage contributes to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// A stage that produces, transforms or consumes the data stream.
    #[default]
    Data,
    /// A pass-through observer (e.g., a progress meter) that must not alter bytes.
    Monitor,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

/// Where a stage's diagnostic stream (stderr) goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsPolicy {
    /// Share the orchestrator's stderr (progress bars, compressor stats).
    Inherit,
    /// Send to the null device.
    Discard,
    /// Drain into a bounded buffer reported with the stage outcome.
    #[default]
    Capture,
}

impl DiagnosticsPolicy {
    /// Returns true if diagnostics are captured into the outcome.
    #[must_use]
    pub fn captures(self) -> bool {
        matches!(self, Self::Capture)
    }

    pub(crate) fn stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Discard => Stdio::null(),
            Self::Capture => Stdio::piped(),
        }
    }
}

impl fmt::Display for DiagnosticsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => write!(f, "inherit"),
            Self::Discard => write!(f, "discard"),
            Self::Capture => write!(f, "capture"),
        }
    }
}

/// Which limit expired when a stage was timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutScope {
    /// The per-stage limit.
    Stage,
    /// The overall pipeline deadline.
    Pipeline,
}

/// How a stage's process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitClass {
    /// Exited with status 0.
    Success,
    /// Exited with a non-zero status.
    NonZeroExit {
        /// The exit code.
        code: i32,
    },
    /// Killed by the orchestrator after a time limit expired.
    Timeout {
        /// The limit that expired.
        scope: TimeoutScope,
    },
    /// Terminated by SIGPIPE: its reader went away.
    BrokenPipe,
    /// Terminated by a signal other than SIGPIPE.
    Signaled {
        /// The signal number.
        signal: i32,
    },
    /// The executable could not be started.
    SpawnFailure,
    /// The process status could not be determined.
    CommunicationError,
    /// Terminated by the orchestrator on abort.
    Cancelled,
    /// Never launched because an earlier stage failed to start.
    NotStarted,
}

impl ExitClass {
    /// Returns true for a clean exit.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the orchestrator itself ended the stage as part of a
    /// pipeline-wide shutdown.
    #[must_use]
    pub fn is_induced(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Timeout {
                    scope: TimeoutScope::Pipeline
                }
        )
    }

    /// Short machine-friendly label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::Timeout { .. } => "timeout",
            Self::BrokenPipe => "broken_pipe",
            Self::Signaled { .. } => "signaled",
            Self::SpawnFailure => "spawn_failure",
            Self::CommunicationError => "communication_error",
            Self::Cancelled => "cancelled",
            Self::NotStarted => "not_started",
        }
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NonZeroExit { code } => write!(f, "exit code {code}"),
            Self::Timeout {
                scope: TimeoutScope::Stage,
            } => write!(f, "timed out (stage limit)"),
            Self::Timeout {
                scope: TimeoutScope::Pipeline,
            } => write!(f, "timed out (pipeline deadline)"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::Signaled { signal } => write!(f, "killed by signal {signal}"),
            Self::SpawnFailure => write!(f, "failed to start"),
            Self::CommunicationError => write!(f, "communication error"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::NotStarted => write!(f, "not started"),
        }
    }
}
