//! Output sink ownership: exclusive creation, finalization and rollback.

use super::spec::OutputSink;
use crate::errors::{CleanupError, ConfigurationError};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, warn};

/// Owns the destination of the last stage's output for one run.
///
/// A file sink that is neither committed nor discarded when the manager is
/// dropped (e.g. the orchestrating task panicked) is removed on drop.
#[derive(Debug)]
pub(crate) struct SinkManager {
    file: Option<SinkFile>,
}

#[derive(Debug)]
struct SinkFile {
    path: PathBuf,
    handle: Option<File>,
    settled: bool,
}

/// How a file sink was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discarded {
    /// The partial file was deleted.
    Removed,
    /// Nothing to delete (inherited output, or the file was already gone).
    Nothing,
}

impl SinkManager {
    /// Prepares the sink. A file is created exclusively, with its parent
    /// directories; an existing file is left untouched and rejected.
    pub(crate) fn open(output: &OutputSink) -> Result<Self, ConfigurationError> {
        let OutputSink::File(path) = output else {
            return Ok(Self { file: None });
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigurationError::sink_unusable(path, format!("cannot create parent directory: {e}"))
            })?;
        }

        let handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ConfigurationError::sink_exists(path),
                _ => ConfigurationError::sink_unusable(path, e.to_string()),
            })?;
        debug!(path = %path.display(), "Output sink created");

        Ok(Self {
            file: Some(SinkFile {
                path: path.clone(),
                handle: Some(handle),
                settled: false,
            }),
        })
    }

    /// Returns the sink file path, if any.
    pub(crate) fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Returns the standard output handle for the last stage.
    pub(crate) fn stdio(&self) -> std::io::Result<Stdio> {
        match self.file.as_ref().and_then(|f| f.handle.as_ref()) {
            Some(handle) => Ok(Stdio::from(handle.try_clone()?)),
            None => Ok(Stdio::inherit()),
        }
    }

    /// Flushes a successful file sink to stable storage and closes it.
    pub(crate) async fn commit(mut self) -> Result<(), CleanupError> {
        let Some(sink) = self.file.as_mut() else {
            return Ok(());
        };
        sink.settled = true;

        let Some(handle) = sink.handle.take() else {
            return Ok(());
        };
        tokio::fs::File::from_std(handle)
            .sync_all()
            .await
            .map_err(|e| CleanupError::new(&sink.path, format!("failed to flush output: {e}")))
    }

    /// Deletes a file sink after a failed run.
    pub(crate) async fn discard(mut self) -> Result<Discarded, CleanupError> {
        let Some(sink) = self.file.as_mut() else {
            return Ok(Discarded::Nothing);
        };
        sink.settled = true;
        drop(sink.handle.take());

        match tokio::fs::remove_file(&sink.path).await {
            Ok(()) => Ok(Discarded::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Discarded::Nothing),
            Err(e) => Err(CleanupError::new(&sink.path, e.to_string())),
        }
    }
}

impl Drop for SinkManager {
    fn drop(&mut self) {
        let Some(sink) = self.file.as_mut() else {
            return;
        };
        if sink.settled {
            return;
        }
        drop(sink.handle.take());
        match std::fs::remove_file(&sink.path) {
            Ok(()) => warn!(path = %sink.path.display(), "Removed unsettled output file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %sink.path.display(),
                error = %e,
                "Failed to remove unsettled output file"
            ),
        }
    }
}
