//! Testing utilities for pipechain.
//!
//! This module provides:
//! - Shell-script stages for process-level tests
//! - Outcome builders for classification tests and benchmarks
//! - Assertions over pipeline results

mod assertions;
mod fixtures;

pub use assertions::{
    assert_collateral, assert_no_sink, assert_primary_failure, assert_succeeded,
};
pub use fixtures::{outcomes_from, sh_stage, TestPipeline};
