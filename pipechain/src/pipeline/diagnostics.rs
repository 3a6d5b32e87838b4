//! Bounded draining of a stage's diagnostic stream.

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// What was read from a diagnostic stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DiagnosticsReport {
    /// The kept tail of the stream, lossily decoded and trimmed.
    pub(crate) text: String,
    /// Bytes discarded from the front to respect the limit.
    pub(crate) dropped: u64,
    /// Read error that ended draining early.
    pub(crate) error: Option<String>,
}

/// Reads `reader` to EOF, keeping at most the last `limit` bytes.
///
/// Reading continues after the limit is reached so the writer never blocks
/// on a full pipe; the oldest bytes are dropped instead. Errors typically
/// come last in a tool's output, hence the tail is kept.
pub(crate) async fn drain<R>(mut reader: R, limit: usize) -> DiagnosticsReport
where
    R: AsyncRead + Unpin,
{
    let mut kept: Vec<u8> = Vec::new();
    let mut dropped: u64 = 0;
    let mut error = None;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > limit {
                    let excess = kept.len() - limit;
                    kept.drain(..excess);
                    dropped += excess as u64;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }

    DiagnosticsReport {
        text: String::from_utf8_lossy(&kept).trim().to_string(),
        dropped,
        error,
    }
}
