//! Loading pipeline specifications from JSON.
//!
//! ```json
//! {
//!   "name": "export vm-100",
//!   "stages": [
//!     {"executable": "zfs", "arguments": ["send", "tank/vm-100-disk-0@s1"]},
//!     {"executable": "pv", "role": "monitor", "diagnostics": "inherit"},
//!     {"executable": "zstd", "arguments": ["-c"]}
//!   ],
//!   "output": {"file": "/backup/vm-100.zst"},
//!   "overall_timeout_secs": 14400
//! }
//! ```

use crate::errors::ConfigurationError;
use crate::pipeline::PipelineSpec;
use std::path::Path;

/// Reads, parses and validates a specification file.
///
/// # Errors
/// - File read failure (`PIPELINE-006-FORMAT`)
/// - Parse failure (`PIPELINE-006-FORMAT`)
/// - Validation failure
pub fn load_spec(path: &Path) -> Result<PipelineSpec, ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigurationError::format(format!("cannot read '{}': {e}", path.display()))
    })?;
    parse_spec(&content)
}

/// Parses and validates a specification.
///
/// # Errors
/// - Parse failure (`PIPELINE-006-FORMAT`)
/// - Validation failure
pub fn parse_spec(content: &str) -> Result<PipelineSpec, ConfigurationError> {
    let spec: PipelineSpec = serde_json::from_str(content).map_err(|e| {
        ConfigurationError::format(format!("line {} column {}: {e}", e.line(), e.column()))
    })?;
    spec.validate()?;
    Ok(spec)
}

/// Serializes a specification as pretty JSON.
///
/// # Errors
/// Returns a format error if serialization fails.
pub fn to_json(spec: &PipelineSpec) -> Result<String, ConfigurationError> {
    serde_json::to_string_pretty(spec).map_err(|e| ConfigurationError::format(e.to_string()))
}
