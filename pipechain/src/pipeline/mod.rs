//! Pipeline specification and execution.
//!
//! This module provides:
//! - Pipeline specifications (stages, input, output, time limits)
//! - Pipe plumbing between stages
//! - Per-stage supervision and diagnostics draining
//! - Failure classification
//! - The coordinator that runs a pipeline and cleans up after it

mod classification;
mod coordinator;
mod diagnostics;
mod plumbing;
mod result;
mod sink;
mod spec;
mod supervisor;

#[cfg(test)]
mod integration_tests;

pub use classification::{classify, FailureClassification};
pub use coordinator::PipelineRunner;
pub use result::PipelineResult;
pub use spec::{
    InputSource, OutputSink, PipelineSpec, DEFAULT_DIAGNOSTICS_LIMIT, DEFAULT_STAGE_TIMEOUT,
};
pub use supervisor::TERMINATION_GRACE;
