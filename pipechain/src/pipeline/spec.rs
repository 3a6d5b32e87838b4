//! Pipeline specification: ordered stages plus input, output and time limits.

use crate::errors::ConfigurationError;
use crate::stages::StageDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-stage limit. Snapshot streams of large datasets run for hours.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Default bound on captured diagnostics per stage.
pub const DEFAULT_DIAGNOSTICS_LIMIT: usize = 64 * 1024;

/// Where the first stage reads from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// The null device.
    #[default]
    Null,
    /// The orchestrator's own standard input.
    Inherit,
    /// A file opened read-only.
    File(PathBuf),
}

/// Where the last stage writes to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSink {
    /// The orchestrator's own standard output.
    #[default]
    Inherit,
    /// A file created exclusively; deleted again if the pipeline fails.
    File(PathBuf),
}

impl OutputSink {
    /// Returns the file path, if the sink is a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Inherit => None,
            Self::File(path) => Some(path),
        }
    }
}

/// Specification for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Stages in data-flow order; index 0 is the producer.
    pub stages: Vec<StageDescriptor>,
    /// Input of the first stage.
    #[serde(default)]
    pub input: InputSource,
    /// Output of the last stage.
    #[serde(default)]
    pub output: OutputSink,
    /// Limit on each stage's run time.
    #[serde(
        default = "default_stage_timeout",
        rename = "stage_timeout_secs",
        with = "secs"
    )]
    pub stage_timeout: Option<Duration>,
    /// Limit on the whole wait phase.
    #[serde(default, rename = "overall_timeout_secs", with = "secs")]
    pub overall_timeout: Option<Duration>,
    /// Bytes of diagnostics kept per capturing stage.
    #[serde(default = "default_diagnostics_limit")]
    pub diagnostics_limit: usize,
}

fn default_name() -> String {
    "pipeline".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_stage_timeout() -> Option<Duration> {
    Some(DEFAULT_STAGE_TIMEOUT)
}

fn default_diagnostics_limit() -> usize {
    DEFAULT_DIAGNOSTICS_LIMIT
}

impl PipelineSpec {
    /// Creates a pipeline specification with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if `stages` is empty.
    pub fn new(
        stages: impl IntoIterator<Item = StageDescriptor>,
    ) -> Result<Self, ConfigurationError> {
        let stages: Vec<_> = stages.into_iter().collect();
        if stages.is_empty() {
            return Err(ConfigurationError::empty_pipeline());
        }

        Ok(Self {
            name: default_name(),
            stages,
            input: InputSource::default(),
            output: OutputSink::default(),
            stage_timeout: default_stage_timeout(),
            overall_timeout: None,
            diagnostics_limit: DEFAULT_DIAGNOSTICS_LIMIT,
        })
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the input of the first stage.
    #[must_use]
    pub fn with_input(mut self, input: InputSource) -> Self {
        self.input = input;
        self
    }

    /// Redirects the last stage into a file.
    #[must_use]
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputSink::File(path.into());
        self
    }

    /// Sets the per-stage limit (`None` disables it).
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Sets the overall limit (`None` disables it).
    #[must_use]
    pub fn with_overall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Sets the bound on captured diagnostics per stage.
    #[must_use]
    pub fn with_diagnostics_limit(mut self, limit: usize) -> Self {
        self.diagnostics_limit = limit;
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Renders the pipeline as a shell command line (`a | b > file`).
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self
            .stages
            .iter()
            .map(StageDescriptor::command_line)
            .collect::<Vec<_>>()
            .join(" | ");
        if let InputSource::File(ref path) = self.input {
            line = format!("{line} < {}", path.display());
        }
        if let OutputSink::File(ref path) = self.output {
            line = format!("{line} > {}", path.display());
        }
        line
    }

    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pipeline, a malformed stage, a zero
    /// time limit, a zero diagnostics limit, or an unusable output path.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.stages.is_empty() {
            return Err(ConfigurationError::empty_pipeline());
        }
        for (index, stage) in self.stages.iter().enumerate() {
            stage.validate(index)?;
        }
        if self.stage_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigurationError::invalid_limit(
                "stage timeout",
                "must be greater than zero",
            ));
        }
        if self.overall_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigurationError::invalid_limit(
                "overall timeout",
                "must be greater than zero",
            ));
        }
        if self.diagnostics_limit == 0 {
            return Err(ConfigurationError::invalid_limit(
                "diagnostics limit",
                "must be at least one byte",
            ));
        }
        if let OutputSink::File(ref path) = self.output {
            if path.as_os_str().is_empty() {
                return Err(ConfigurationError::sink_unusable(path, "path is empty"));
            }
            if path.is_dir() {
                return Err(ConfigurationError::sink_unusable(path, "path is a directory"));
            }
        }
        Ok(())
    }
}

/// Optional durations as floating seconds (`null` = no limit).
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_stages() -> Vec<StageDescriptor> {
        vec![
            StageDescriptor::new("zfs").args(["send", "tank/vm-100-disk-0@s1"]),
            StageDescriptor::new("zstd").arg("-c"),
        ]
    }

    #[test]
    fn test_pipeline_spec_creation() {
        let spec = PipelineSpec::new(two_stages()).unwrap().named("export");
        assert_eq!(spec.name, "export");
        assert_eq!(spec.stage_count(), 2);
        assert_eq!(spec.stage_timeout, Some(DEFAULT_STAGE_TIMEOUT));
        assert_eq!(spec.overall_timeout, None);
        assert_eq!(spec.input, InputSource::Null);
        assert_eq!(spec.output, OutputSink::Inherit);
    }

    #[test]
    fn test_pipeline_spec_rejects_empty() {
        let err = PipelineSpec::new(Vec::new()).unwrap_err();
        assert_eq!(err.code, "PIPELINE-001-EMPTY");
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let spec = PipelineSpec::new(two_stages())
            .unwrap()
            .with_stage_timeout(Some(Duration::ZERO));
        assert_eq!(spec.validate().unwrap_err().code, "PIPELINE-003-TIMEOUT");

        let spec = PipelineSpec::new(two_stages())
            .unwrap()
            .with_overall_timeout(Some(Duration::ZERO));
        assert!(spec.validate().is_err());

        let spec = PipelineSpec::new(two_stages()).unwrap().with_diagnostics_limit(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_directory_sink() {
        let dir = tempfile::tempdir().unwrap();
        let spec = PipelineSpec::new(two_stages())
            .unwrap()
            .with_output_file(dir.path());
        assert_eq!(spec.validate().unwrap_err().code, "PIPELINE-004-SINK");
    }

    #[test]
    fn test_validate_reports_bad_stage_index() {
        let mut stages = two_stages();
        stages.push(StageDescriptor::new(""));
        let spec = PipelineSpec::new(stages).unwrap();
        assert_eq!(spec.validate().unwrap_err().stage, Some(2));
    }

    #[test]
    fn test_command_line() {
        let spec = PipelineSpec::new(two_stages())
            .unwrap()
            .with_output_file("/backup/vm-100.zst");
        assert_eq!(
            spec.command_line(),
            "zfs send tank/vm-100-disk-0@s1 | zstd -c > /backup/vm-100.zst"
        );

        let spec = PipelineSpec::new(vec![StageDescriptor::new("zstd").arg("-d")])
            .unwrap()
            .with_input(InputSource::File("/backup/a.zst".into()));
        assert_eq!(spec.command_line(), "zstd -d < /backup/a.zst");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: PipelineSpec = serde_json::from_str(
            r#"{
                "stages": [{"executable": "cat"}],
                "output": {"file": "/tmp/out"},
                "overall_timeout_secs": 1.5
            }"#,
        )
        .unwrap();

        assert_eq!(spec.name, "pipeline");
        assert_eq!(spec.output, OutputSink::File("/tmp/out".into()));
        assert_eq!(spec.stage_timeout, Some(DEFAULT_STAGE_TIMEOUT));
        assert_eq!(spec.overall_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(spec.diagnostics_limit, DEFAULT_DIAGNOSTICS_LIMIT);
    }

    #[test]
    fn test_null_timeout_disables_limit() {
        let spec: PipelineSpec = serde_json::from_str(
            r#"{"stages": [{"executable": "cat"}], "stage_timeout_secs": null}"#,
        )
        .unwrap();
        assert_eq!(spec.stage_timeout, None);
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let parsed: Result<PipelineSpec, _> = serde_json::from_str(
            r#"{"stages": [{"executable": "cat"}], "stage_timeout_secs": -1}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_seconds() {
        let spec = PipelineSpec::new(two_stages())
            .unwrap()
            .with_overall_timeout(Some(Duration::from_secs(30)));
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["overall_timeout_secs"], 30.0);
        assert_eq!(json["stage_timeout_secs"], 7200.0);
    }
}
