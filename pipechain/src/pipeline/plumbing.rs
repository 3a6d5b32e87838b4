//! Pipe plumbing between consecutive stages.
//!
//! For N stages, N-1 pipes are created, each one just before the stage that
//! writes into it is wired. The parent's copies of both ends are moved into
//! the stage's [`StageWiring`] and released when the spawning command is
//! dropped; the plumbing never duplicates a descriptor.

use crate::core::DiagnosticsPolicy;
use crate::errors::PipelineError;
use nix::fcntl::OFlag;
use std::os::fd::OwnedFd;
use std::process::Stdio;

/// One anonymous pipe, close-on-exec on both ends.
///
/// Close-on-exec matters: without it every stage would inherit the ends of
/// pipes belonging to other stages, and no reader would ever see EOF.
#[derive(Debug)]
pub(crate) struct Pipe {
    pub(crate) reader: OwnedFd,
    pub(crate) writer: OwnedFd,
}

impl Pipe {
    pub(crate) fn new() -> std::io::Result<Self> {
        let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        Ok(Self { reader, writer })
    }
}

/// Standard streams for one stage.
#[derive(Debug)]
pub(crate) struct StageWiring {
    pub(crate) stdin: Stdio,
    pub(crate) stdout: Stdio,
    pub(crate) stderr: Stdio,
    /// Whether the stage leads its own process group. A stage reading the
    /// caller's terminal stays in the caller's group.
    pub(crate) own_group: bool,
}

/// Hands out the streams for each stage, in launch order.
#[derive(Debug)]
pub(crate) struct Plumbing {
    stage_count: usize,
    next_stage: usize,
    input: Option<Stdio>,
    sink: Option<Stdio>,
    /// Read end of the pipe fed by the previously wired stage.
    upstream: Option<OwnedFd>,
    pipes_created: usize,
}

impl Plumbing {
    pub(crate) fn new(stage_count: usize, input: Stdio, sink: Stdio) -> Self {
        Self {
            stage_count,
            next_stage: 0,
            input: Some(input),
            sink: Some(sink),
            upstream: None,
            pipes_created: 0,
        }
    }

    /// Wires the next stage.
    ///
    /// Its stdin is the read end of the previous pipe (or the pipeline input);
    /// its stdout is the write end of a fresh pipe (or the sink, for the last
    /// stage).
    pub(crate) fn wire_next(
        &mut self,
        diagnostics: DiagnosticsPolicy,
    ) -> Result<StageWiring, PipelineError> {
        let index = self.next_stage;
        debug_assert!(index < self.stage_count, "wired more stages than planned");
        self.next_stage += 1;

        let stdin = if index == 0 {
            self.input.take().unwrap_or_else(Stdio::null)
        } else {
            self.upstream.take().map_or_else(Stdio::null, Stdio::from)
        };

        let stdout = if index + 1 == self.stage_count {
            self.sink.take().unwrap_or_else(Stdio::null)
        } else {
            let pipe = Pipe::new().map_err(|source| PipelineError::PipeCreation {
                after_stage: index,
                source,
            })?;
            self.pipes_created += 1;
            self.upstream = Some(pipe.reader);
            Stdio::from(pipe.writer)
        };

        Ok(StageWiring {
            stdin,
            stdout,
            stderr: diagnostics.stdio(),
            own_group: true,
        })
    }

    /// Drops the read end waiting for the next stage.
    ///
    /// Called when a stage failed to launch and no later stage will be wired.
    pub(crate) fn abandon_upstream(&mut self) {
        self.upstream = None;
    }

    pub(crate) fn pipes_created(&self) -> usize {
        self.pipes_created
    }
}
