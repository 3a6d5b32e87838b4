//! Command implementations.

use crate::cli::{CheckArgs, RunArgs};
use anyhow::{Context, Result};
use pipechain::cancellation::{CancelReason, CancellationToken};
use pipechain::config;
use pipechain::errors::{ConfigurationError, PipelineError};
use pipechain::events::LoggingEventSink;
use pipechain::pipeline::{InputSource, OutputSink, PipelineRunner, PipelineSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Exit status for a pipeline that succeeded.
const EXIT_OK: u8 = 0;
/// Exit status for a pipeline that ran and failed.
const EXIT_FAILED: u8 = 1;
/// Exit status for a specification that was rejected.
const EXIT_CONFIG: u8 = 2;

/// Runs the pipeline described by `args`.
pub async fn run_pipeline(args: &RunArgs) -> Result<u8> {
    let spec = match config::load_spec(&args.spec).and_then(|spec| apply_overrides(spec, args)) {
        Ok(spec) => spec,
        Err(e) => return Ok(config_failure(&e)),
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping pipeline");
            interrupt.cancel(CancelReason::requested("interrupted"));
        }
    });

    info!(command = %spec.command_line(), "Running pipeline");
    let runner = PipelineRunner::new().with_event_sink(Arc::new(LoggingEventSink::debug()));
    let result = match runner.run_with_cancel(&spec, cancel).await {
        Ok(result) => result,
        Err(PipelineError::Configuration(e)) => return Ok(config_failure(&e)),
        Err(e) => return Err(e).context("pipeline could not be started"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("{}", result.summary());
    }

    Ok(if result.success { EXIT_OK } else { EXIT_FAILED })
}

/// Validates the specification and prints what would run.
pub fn run_check(args: &CheckArgs) -> Result<u8> {
    let spec = match config::load_spec(&args.spec) {
        Ok(spec) => spec,
        Err(e) => return Ok(config_failure(&e)),
    };

    if args.json {
        println!("{}", config::to_json(&spec)?);
    } else {
        println!("{}", spec.command_line());
    }
    Ok(EXIT_OK)
}

/// Applies command-line overrides and validates the result.
fn apply_overrides(
    mut spec: PipelineSpec,
    args: &RunArgs,
) -> Result<PipelineSpec, ConfigurationError> {
    if let Some(ref path) = args.output {
        spec.output = OutputSink::File(path.clone());
    }
    if let Some(ref path) = args.input {
        spec.input = InputSource::File(path.clone());
    }
    if let Some(secs) = args.stage_timeout {
        spec.stage_timeout = seconds("stage timeout", secs)?;
    }
    if let Some(secs) = args.overall_timeout {
        spec.overall_timeout = seconds("overall timeout", secs)?;
    }
    spec.validate()?;
    Ok(spec)
}

/// Converts a seconds flag; zero disables the limit.
fn seconds(name: &str, secs: f64) -> Result<Option<Duration>, ConfigurationError> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| ConfigurationError::invalid_limit(name, e.to_string()))
}

fn config_failure(error: &ConfigurationError) -> u8 {
    eprintln!("error[{}]: {}", error.code, error.message);
    if let Some(ref hint) = error.fix_hint {
        eprintln!("  hint: {hint}");
    }
    EXIT_CONFIG
}
