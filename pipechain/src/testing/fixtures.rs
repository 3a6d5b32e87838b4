//! Test fixtures for pipeline testing.

use crate::core::{ExitClass, StageRole};
use crate::pipeline::PipelineSpec;
use crate::stages::{StageDescriptor, StageOutcome};
use std::path::PathBuf;
use std::time::Duration;

/// A stage running `script` under `/bin/sh -c`.
#[must_use]
pub fn sh_stage(script: &str) -> StageDescriptor {
    StageDescriptor::new("sh").args(["-c", script])
}

/// Builds one data-stage outcome per exit class, named `stage-{index}`.
#[must_use]
pub fn outcomes_from(classes: &[ExitClass]) -> Vec<StageOutcome> {
    classes
        .iter()
        .enumerate()
        .map(|(index, &class)| {
            StageOutcome::new(index, format!("stage-{index}"), StageRole::Data, class)
        })
        .collect()
}

/// Builder for test pipelines with short, test-friendly limits.
#[derive(Debug, Default)]
pub struct TestPipeline {
    stages: Vec<StageDescriptor>,
    output: Option<PathBuf>,
    stage_timeout: Option<Duration>,
    overall_timeout: Option<Duration>,
}

impl TestPipeline {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: StageDescriptor) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a `sh -c` stage.
    #[must_use]
    pub fn sh(self, script: &str) -> Self {
        self.stage(sh_stage(script))
    }

    /// Appends a `sh -c` monitor stage.
    #[must_use]
    pub fn monitor(self, script: &str) -> Self {
        self.stage(sh_stage(script).with_role(StageRole::Monitor))
    }

    /// Writes the last stage's output to `path`.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Sets the per-stage limit.
    #[must_use]
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Sets the overall limit.
    #[must_use]
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Builds the specification.
    ///
    /// # Panics
    ///
    /// Panics if no stage was added.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn build(self) -> PipelineSpec {
        let mut spec = PipelineSpec::new(self.stages)
            .expect("test pipeline needs at least one stage")
            .named("test")
            .with_stage_timeout(Some(self.stage_timeout.unwrap_or(Duration::from_secs(30))))
            .with_overall_timeout(self.overall_timeout);
        if let Some(path) = self.output {
            spec = spec.with_output_file(path);
        }
        spec
    }
}
