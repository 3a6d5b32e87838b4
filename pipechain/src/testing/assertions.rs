//! Test assertions for pipeline results.

use crate::pipeline::PipelineResult;
use std::path::Path;

/// Asserts that the pipeline succeeded.
pub fn assert_succeeded(result: &PipelineResult) {
    assert!(
        result.success,
        "Expected success, got:\n{}",
        result.summary()
    );
    assert!(result.primary_failure.is_none());
}

/// Asserts that the pipeline failed with `index` as its primary failure.
pub fn assert_primary_failure(result: &PipelineResult, index: usize) {
    assert!(!result.success, "Expected failure, pipeline succeeded");
    let primary = result.primary_failure.as_ref().map(|o| o.stage_index);
    assert_eq!(
        primary,
        Some(index),
        "Expected primary failure at stage {index}, got {primary:?}:\n{}",
        result.summary()
    );
}

/// Asserts that exactly the stages in `indices` are collateral.
pub fn assert_collateral(result: &PipelineResult, indices: &[usize]) {
    let actual: Vec<usize> = result.collateral().map(|o| o.stage_index).collect();
    assert_eq!(
        actual,
        indices,
        "Unexpected collateral stages:\n{}",
        result.summary()
    );
}

/// Asserts that no output file remains at `path`.
pub fn assert_no_sink(path: &Path) {
    assert!(
        !path.exists(),
        "Expected '{}' to be removed",
        path.display()
    );
}
