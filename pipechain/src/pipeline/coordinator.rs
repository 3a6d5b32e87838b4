//! Pipeline coordinator: launch, join, classify, finalize.

use super::classification::classify;
use super::plumbing::Plumbing;
use super::result::PipelineResult;
use super::sink::{Discarded, SinkManager};
use super::spec::{InputSource, PipelineSpec};
use super::supervisor::{self, sleep_until_or_pending, SupervisorContext};
use crate::cancellation::{CancelReason, CancellationToken, OrderedTaskGroup};
use crate::core::ExitClass;
use crate::errors::{ConfigurationError, PipelineError, Result};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::stages::StageOutcome;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where a stage's outcome will come from.
enum Slot {
    /// Position of the stage's supervisor in the task group.
    Running(usize),
    /// Known without supervision (launch failure, never started).
    Settled(StageOutcome),
}

/// Runs pipelines.
///
/// A runner is cheap and stateless between runs; each call to [`run`]
/// owns its pipes, processes and output file until it returns.
///
/// [`run`]: PipelineRunner::run
#[derive(Clone)]
pub struct PipelineRunner {
    events: Arc<dyn EventSink>,
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self {
            events: Arc::new(NoOpEventSink),
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner").finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner that emits no events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// Stage failures are reported in the returned [`PipelineResult`]. An
    /// `Err` means the pipeline was rejected before launch or its plumbing
    /// could not be built.
    pub async fn run(&self, spec: &PipelineSpec) -> Result<PipelineResult> {
        self.run_with_cancel(spec, CancellationToken::new()).await
    }

    /// Runs the pipeline, stopping every running stage once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        spec: &PipelineSpec,
        cancel: Arc<CancellationToken>,
    ) -> Result<PipelineResult> {
        spec.validate()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id, pipeline = %spec.name);
        self.execute(spec, run_id, &cancel).instrument(span).await
    }

    /// Runs the pipeline on a private single-threaded runtime.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(&self, spec: &PipelineSpec) -> Result<PipelineResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build runtime: {e}")))?;
        runtime.block_on(self.run(spec))
    }

    async fn execute(
        &self,
        spec: &PipelineSpec,
        run_id: Uuid,
        caller: &CancellationToken,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let deadline = spec
            .overall_timeout
            .map(|limit| tokio::time::Instant::from_std(started) + limit);
        let stage_count = spec.stage_count();

        let input = open_input(&spec.input)?;
        let sink = SinkManager::open(&spec.output)?;
        let output = sink.stdio()?;

        info!(stages = stage_count, command = %spec.command_line(), "Starting pipeline");
        self.events
            .emit(&PipelineEvent::PipelineStarted {
                run_id,
                name: spec.name.clone(),
                stage_count,
                command_line: spec.command_line(),
            })
            .await;

        let cancel = CancellationToken::new();
        let ctx = SupervisorContext {
            run_id,
            stage_timeout: spec.stage_timeout,
            cancel: cancel.clone(),
            events: self.events.clone(),
        };
        let mut plumbing = Plumbing::new(stage_count, input, output);
        let mut group = OrderedTaskGroup::new();
        let mut slots = Vec::with_capacity(stage_count);

        for (index, stage) in spec.stages.iter().enumerate() {
            if let Some(reason) = caller.reason() {
                self.cancel_all(&cancel, reason, run_id).await;
            } else if deadline.is_some_and(|d| d <= tokio::time::Instant::now()) {
                self.cancel_all(&cancel, CancelReason::Deadline, run_id).await;
            }
            if cancel.is_cancelled() {
                slots.push(Slot::Settled(StageOutcome::new(
                    index,
                    stage.name(),
                    stage.role(),
                    ExitClass::NotStarted,
                )));
                continue;
            }

            let mut wiring = match plumbing.wire_next(stage.diagnostics()) {
                Ok(wiring) => wiring,
                Err(e) => {
                    error!(stage_index = index, error = %e, "Pipe creation failed");
                    cancel.cancel(CancelReason::LaunchFailed { stage_index: index });
                    drop(plumbing);
                    group.join().await;
                    if let Err(cleanup) = sink.discard().await {
                        warn!(error = %cleanup, "Failed to remove output after pipe failure");
                    }
                    return Err(e);
                }
            };

            if index == 0 && matches!(spec.input, InputSource::Inherit) {
                wiring.own_group = false;
            }

            match supervisor::launch(index, stage, wiring, spec.diagnostics_limit) {
                Ok(running) => {
                    debug!(stage_index = index, stage = stage.name(), pid = ?running.pid(), "Stage spawned");
                    self.events
                        .emit(&PipelineEvent::StageSpawned {
                            run_id,
                            stage_index: index,
                            stage_name: stage.name().to_string(),
                            pid: running.pid(),
                        })
                        .await;
                    let task = group.spawn(running.supervise(ctx.clone()).in_current_span());
                    slots.push(Slot::Running(task));
                }
                Err(outcome) => {
                    error!(
                        stage_index = index,
                        stage = stage.name(),
                        error = %outcome.diagnostics,
                        "Stage failed to launch"
                    );
                    self.events
                        .emit(&PipelineEvent::StageLaunchFailed {
                            run_id,
                            stage_index: index,
                            stage_name: stage.name().to_string(),
                            error: outcome.diagnostics.clone(),
                        })
                        .await;
                    plumbing.abandon_upstream();
                    self.cancel_all(&cancel, CancelReason::LaunchFailed { stage_index: index }, run_id)
                        .await;
                    slots.push(Slot::Settled(outcome));
                }
            }
        }

        debug!(
            launched = group.len(),
            pipes = plumbing.pipes_created(),
            "Launch phase complete"
        );
        drop(plumbing);

        let joined = {
            let join = group.join();
            tokio::pin!(join);
            tokio::select! {
                results = &mut join => results,
                () = sleep_until_or_pending(deadline) => {
                    self.cancel_all(&cancel, CancelReason::Deadline, run_id).await;
                    join.await
                }
                reason = caller.cancelled() => {
                    self.cancel_all(&cancel, reason, run_id).await;
                    join.await
                }
            }
        };

        let mut outcomes = collect_outcomes(spec, slots, joined);
        let verdict = classify(&outcomes);
        verdict.apply(&mut outcomes);
        log_verdict(&outcomes, verdict.primary_failure);

        let sink_path = sink.path().map(Path::to_path_buf);
        let mut cleanup_errors = Vec::new();
        let settled = if verdict.success {
            sink.commit().await.map(|()| Discarded::Nothing)
        } else {
            sink.discard().await
        };
        let sink_finalized = match settled {
            Ok(Discarded::Removed) => {
                if let Some(path) = sink_path {
                    info!(path = %path.display(), "Removed partial output");
                    self.events
                        .emit(&PipelineEvent::SinkRemoved { run_id, path })
                        .await;
                }
                true
            }
            Ok(Discarded::Nothing) => true,
            Err(cleanup) => {
                warn!(path = %cleanup.path.display(), error = %cleanup.message, "Output cleanup failed");
                self.events
                    .emit(&PipelineEvent::CleanupFailed {
                        run_id,
                        path: cleanup.path.clone(),
                        error: cleanup.message.clone(),
                    })
                    .await;
                cleanup_errors.push(cleanup);
                false
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(success = verdict.success, duration_ms, "Pipeline finished");
        self.events
            .emit(&PipelineEvent::PipelineFinished {
                run_id,
                success: verdict.success,
                primary_failure: verdict.primary_failure,
                duration_ms,
            })
            .await;

        Ok(PipelineResult {
            run_id,
            name: spec.name.clone(),
            success: verdict.success,
            primary_failure: verdict
                .primary_failure
                .and_then(|index| outcomes.get(index).cloned()),
            outcomes,
            sink_finalized,
            cleanup_errors,
            duration_ms,
        })
    }

    async fn cancel_all(&self, cancel: &CancellationToken, reason: CancelReason, run_id: Uuid) {
        if !cancel.cancel(reason.clone()) {
            return;
        }
        warn!(%reason, "Stopping running stages");
        self.events
            .emit(&PipelineEvent::PipelineCancelled {
                run_id,
                reason: reason.to_string(),
            })
            .await;
    }
}

fn open_input(input: &InputSource) -> std::result::Result<Stdio, ConfigurationError> {
    match input {
        InputSource::Null => Ok(Stdio::null()),
        InputSource::Inherit => Ok(Stdio::inherit()),
        InputSource::File(path) => std::fs::File::open(path)
            .map(Stdio::from)
            .map_err(|e| ConfigurationError::input_unusable(path, e.to_string())),
    }
}

/// Puts one outcome per stage in stage order.
fn collect_outcomes(
    spec: &PipelineSpec,
    slots: Vec<Slot>,
    joined: Vec<std::result::Result<StageOutcome, JoinError>>,
) -> Vec<StageOutcome> {
    let mut joined: Vec<_> = joined.into_iter().map(Some).collect();

    slots
        .into_iter()
        .zip(&spec.stages)
        .enumerate()
        .map(|(index, (slot, stage))| {
            let lost = |note: String| {
                StageOutcome::new(index, stage.name(), stage.role(), ExitClass::CommunicationError)
                    .with_note(note)
            };
            match slot {
                Slot::Settled(outcome) => outcome,
                Slot::Running(task) => match joined.get_mut(task).and_then(Option::take) {
                    Some(Ok(outcome)) => outcome,
                    Some(Err(e)) => lost(format!("stage supervisor failed: {e}")),
                    None => lost("stage supervisor result missing".to_string()),
                },
            }
        })
        .collect()
}

fn log_verdict(outcomes: &[StageOutcome], primary: Option<usize>) {
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        if Some(outcome.stage_index) == primary {
            error!(
                stage_index = outcome.stage_index,
                stage = %outcome.stage_name,
                exit_class = %outcome.exit_class,
                diagnostics = %outcome.diagnostics,
                "Primary failure"
            );
        } else if outcome.collateral {
            warn!(
                stage_index = outcome.stage_index,
                stage = %outcome.stage_name,
                exit_class = %outcome.exit_class,
                "Collateral failure"
            );
        } else {
            error!(
                stage_index = outcome.stage_index,
                stage = %outcome.stage_name,
                exit_class = %outcome.exit_class,
                diagnostics = %outcome.diagnostics,
                "Stage failed"
            );
        }
    }
}
