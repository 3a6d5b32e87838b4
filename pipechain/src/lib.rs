//! # Pipechain
//!
//! Supervised pipelines of external processes joined by OS pipes.
//!
//! Pipechain runs a chain such as `zfs send | pv | zstd > file` with:
//!
//! - **Explicit plumbing**: one close-on-exec pipe per adjacent pair of stages
//! - **Per-stage supervision**: a task per stage that waits, drains stderr and
//!   enforces time limits (SIGTERM, grace period, SIGKILL)
//! - **Failure classification**: broken pipes caused by a failing downstream
//!   stage are reported as collateral, not as the cause
//! - **Guaranteed cleanup**: a partially written output file is removed when
//!   the pipeline fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipechain::prelude::*;
//!
//! # async fn example() -> pipechain::errors::Result<()> {
//! let spec = PipelineSpec::new(vec![
//!     StageDescriptor::new("zfs").args(["send", "tank/vm-100-disk-0@s1"]),
//!     StageDescriptor::monitor("pv"),
//!     StageDescriptor::new("zstd").arg("-c"),
//! ])?
//! .with_output_file("/backup/vm-100.zst");
//!
//! let result = PipelineRunner::new().run(&spec).await?;
//! if !result.success {
//!     eprintln!("{}", result.summary());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancellationToken};
    pub use crate::core::{DiagnosticsPolicy, ExitClass, StageRole, TimeoutScope};
    pub use crate::errors::{CleanupError, ConfigurationError, PipelineError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{
        InputSource, OutputSink, PipelineResult, PipelineRunner, PipelineSpec,
    };
    pub use crate::stages::{StageDescriptor, StageOutcome};
}
