//! Stage supervision.
//!
//! One supervisor task per stage owns the child process. It waits for the
//! process under the per-stage limit and the shared cancellation token,
//! stops it (SIGTERM, grace period, SIGKILL) when a limit fires, and turns
//! the result into a [`StageOutcome`]. Diagnostics are drained on a separate
//! task so a chatty stderr never stalls the wait.
//!
//! Each stage normally leads its own process group, and signals go to the
//! whole group so that helpers forked by a stage (a shell's children, for
//! instance) stop with it instead of holding the pipes open.

use super::diagnostics::{self, DiagnosticsReport};
use super::plumbing::StageWiring;
use crate::cancellation::{CancelReason, CancellationToken};
use crate::core::{ExitClass, TimeoutScope};
use crate::events::{EventSink, PipelineEvent};
use crate::stages::{StageDescriptor, StageOutcome};
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Wait between SIGTERM and SIGKILL. Fixed so that the worst-case latency
/// of a stopped pipeline stays bounded.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(5);

const SIGPIPE: i32 = Signal::SIGPIPE as i32;

/// Shared, read-only inputs of every supervisor of one run.
#[derive(Clone)]
pub(crate) struct SupervisorContext {
    pub(crate) run_id: Uuid,
    pub(crate) stage_timeout: Option<Duration>,
    pub(crate) cancel: Arc<CancellationToken>,
    pub(crate) events: Arc<dyn EventSink>,
}

/// A launched stage awaiting supervision.
pub(crate) struct RunningStage {
    index: usize,
    descriptor: StageDescriptor,
    child: Child,
    pid: Option<u32>,
    /// Process group led by the stage, if it has its own.
    group: Option<Pid>,
    diagnostics: Option<JoinHandle<DiagnosticsReport>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    StageLimit,
    Cancelled(CancelReason),
}

/// Spawns the stage's process with the given streams.
///
/// The command holds the parent's copies of the pipe ends handed over in
/// `wiring`; it is dropped right after the spawn attempt, whether or not the
/// spawn succeeded, so EOF and EPIPE can propagate along the chain.
pub(crate) fn launch(
    index: usize,
    descriptor: &StageDescriptor,
    wiring: StageWiring,
    diagnostics_limit: usize,
) -> Result<RunningStage, StageOutcome> {
    let started = Instant::now();
    let started_at = Utc::now();

    let own_group = wiring.own_group;
    let mut command = Command::new(descriptor.executable());
    if own_group {
        command.process_group(0);
    }
    command
        .args(descriptor.arguments())
        .stdin(wiring.stdin)
        .stdout(wiring.stdout)
        .stderr(wiring.stderr)
        .kill_on_drop(true);
    let spawned = command.spawn();
    drop(command);

    match spawned {
        Ok(mut child) => {
            let pid = child.id();
            let group = pid
                .filter(|_| own_group)
                .and_then(|raw| i32::try_from(raw).ok())
                .map(Pid::from_raw);
            let drain_task = child
                .stderr
                .take()
                .map(|stderr| tokio::spawn(diagnostics::drain(stderr, diagnostics_limit)));
            Ok(RunningStage {
                index,
                descriptor: descriptor.clone(),
                child,
                pid,
                group,
                diagnostics: drain_task,
                started,
                started_at,
            })
        }
        Err(e) => Err(StageOutcome::new(
            index,
            descriptor.name(),
            descriptor.role(),
            ExitClass::SpawnFailure,
        )
        .with_diagnostics(format!("failed to start '{}': {e}", descriptor.executable()))
        .with_timing(started_at, started.elapsed())),
    }
}

impl RunningStage {
    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the process and reports how it ended.
    pub(crate) async fn supervise(mut self, ctx: SupervisorContext) -> StageOutcome {
        let waited = tokio::select! {
            biased;
            status = self.child.wait() => Waited::Exited(status),
            () = sleep_or_pending(ctx.stage_timeout) => Waited::StageLimit,
            reason = ctx.cancel.cancelled() => Waited::Cancelled(reason),
        };

        let mut notes = Vec::new();
        let exit_class = match waited {
            Waited::Exited(Ok(status)) => classify_exit(status),
            Waited::Exited(Err(e)) => {
                notes.push(format!("failed to wait for process: {e}"));
                self.stop(ExitClass::CommunicationError, "wait failed", &ctx, &mut notes)
                    .await
            }
            Waited::StageLimit => {
                let class = ExitClass::Timeout {
                    scope: TimeoutScope::Stage,
                };
                self.stop(class, "stage timeout", &ctx, &mut notes).await
            }
            Waited::Cancelled(reason) => {
                let class = match reason {
                    CancelReason::Deadline => ExitClass::Timeout {
                        scope: TimeoutScope::Pipeline,
                    },
                    CancelReason::LaunchFailed { .. } | CancelReason::Requested { .. } => {
                        ExitClass::Cancelled
                    }
                };
                self.stop(class, &reason.to_string(), &ctx, &mut notes).await
            }
        };

        let report = self.collect_diagnostics(&mut notes).await;
        let elapsed = self.started.elapsed();

        debug!(
            run_id = %ctx.run_id,
            stage_index = self.index,
            stage = self.descriptor.name(),
            pid = ?self.pid,
            exit_class = exit_class.label(),
            duration_ms = elapsed.as_millis() as u64,
            "Stage finished"
        );

        let mut outcome = StageOutcome::new(
            self.index,
            self.descriptor.name(),
            self.descriptor.role(),
            exit_class,
        )
        .with_diagnostics(report.text)
        .with_pid(self.pid)
        .with_timing(self.started_at, elapsed);
        outcome.diagnostics_dropped = report.dropped;
        outcome.notes = notes;

        ctx.events
            .emit(&PipelineEvent::StageFinished {
                run_id: ctx.run_id,
                stage_index: self.index,
                exit_class,
                duration_ms: outcome.duration_ms,
            })
            .await;

        outcome
    }

    /// Stops the process unless it already exited, in which case its real
    /// status wins over `class`.
    async fn stop(
        &mut self,
        class: ExitClass,
        reason: &str,
        ctx: &SupervisorContext,
        notes: &mut Vec<String>,
    ) -> ExitClass {
        if let Ok(Some(status)) = self.child.try_wait() {
            return classify_exit(status);
        }

        warn!(
            run_id = %ctx.run_id,
            stage_index = self.index,
            stage = self.descriptor.name(),
            pid = ?self.pid,
            reason,
            "Terminating stage"
        );
        ctx.events
            .emit(&PipelineEvent::StageTerminating {
                run_id: ctx.run_id,
                stage_index: self.index,
                reason: reason.to_string(),
            })
            .await;

        if let Err(e) = terminate(&mut self.child, self.group).await {
            notes.push(format!("termination failed: {e}"));
        }
        class
    }

    async fn collect_diagnostics(&mut self, notes: &mut Vec<String>) -> DiagnosticsReport {
        let Some(handle) = self.diagnostics.take() else {
            return DiagnosticsReport::default();
        };
        let abort = handle.abort_handle();

        match timeout(TERMINATION_GRACE, handle).await {
            Ok(Ok(report)) => {
                if let Some(ref e) = report.error {
                    notes.push(format!("diagnostic stream error: {e}"));
                }
                report
            }
            Ok(Err(e)) => {
                notes.push(format!("diagnostic reader failed: {e}"));
                DiagnosticsReport::default()
            }
            Err(_) => {
                // A descendant of the stage still holds stderr open.
                abort.abort();
                notes.push("diagnostic stream still open after exit; capture abandoned".to_string());
                if let Some(group) = self.group {
                    match killpg(group, Signal::SIGKILL) {
                        Ok(()) => notes.push("killed processes left in the stage's group".to_string()),
                        Err(Errno::ESRCH) => {}
                        Err(e) => notes.push(format!("failed to kill stage's group: {e}")),
                    }
                }
                DiagnosticsReport::default()
            }
        }
    }
}

/// Sends SIGTERM, waits [`TERMINATION_GRACE`], then SIGKILLs and reaps.
///
/// With a `group`, both signals go to every process in it.
pub(crate) async fn terminate(child: &mut Child, group: Option<Pid>) -> std::io::Result<()> {
    let Some(raw_pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let pid = i32::try_from(raw_pid)
        .map(Pid::from_raw)
        .map_err(|_| std::io::Error::other(format!("pid {raw_pid} out of range")))?;

    signal_stage(pid, group, Signal::SIGTERM)?;

    match timeout(TERMINATION_GRACE, child.wait()).await {
        Ok(status) => status.map(drop),
        Err(_) => {
            warn!(pid = raw_pid, "Process ignored SIGTERM, killing");
            if group.is_some() {
                signal_stage(pid, group, Signal::SIGKILL)?;
            }
            child.kill().await
        }
    }
}

fn signal_stage(pid: Pid, group: Option<Pid>, signal: Signal) -> std::io::Result<()> {
    let sent = match group {
        Some(group) => killpg(group, signal),
        None => kill(pid, signal),
    };
    match sent {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Maps a process exit status to an [`ExitClass`].
///
/// Shells report a child killed by SIGPIPE as exit code 128 + SIGPIPE; that
/// is classified as a broken pipe too.
pub(crate) fn classify_exit(status: ExitStatus) -> ExitClass {
    match (status.code(), status.signal()) {
        (Some(0), _) => ExitClass::Success,
        (Some(code), _) if code == 128 + SIGPIPE => ExitClass::BrokenPipe,
        (Some(code), _) => ExitClass::NonZeroExit { code },
        (None, Some(signal)) if signal == SIGPIPE => ExitClass::BrokenPipe,
        (None, Some(signal)) => ExitClass::Signaled { signal },
        (None, None) => ExitClass::CommunicationError,
    }
}

async fn sleep_or_pending(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

pub(crate) async fn sleep_until_or_pending(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
