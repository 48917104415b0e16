//! Reader tasks draining a channel's output streams.

use std::io;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::BoxedReader;

/// What the reader reports to the consumer.
#[derive(Debug)]
pub(crate) enum ReaderEvent {
    /// One line, newline included when present.
    Line(Vec<u8>),
    /// The stream ended.
    Eof,
    /// Reading the stream or writing the sink failed.
    Failed(io::Error),
}

/// What the reader hands back when it stops.
#[derive(Debug)]
pub(crate) struct ReaderOutcome {
    /// The sink, unflushed.
    pub sink: Option<BufWriter<File>>,
    /// Bytes written to the sink.
    pub bytes: u64,
}

/// Spawn a task reading `stdout` line by line.
///
/// Each line is appended to `sink` (when given) before it is posted, so the
/// file always holds at least what the consumer has seen. The task stops at
/// end of stream, on error, when the consumer goes away, or on `cancel`; a
/// partial line pending at cancellation still goes to the sink.
pub(crate) fn spawn_reader(
    stdout: BoxedReader,
    tx: mpsc::Sender<ReaderEvent>,
    mut sink: Option<BufWriter<File>>,
    cancel: CancellationToken,
) -> JoinHandle<ReaderOutcome> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut bytes = 0u64;

        loop {
            let mut line = Vec::new();
            let read = tokio::select! {
                () = cancel.cancelled() => {
                    if !line.is_empty() {
                        if let Some(sink) = sink.as_mut() {
                            if sink.write_all(&line).await.is_ok() {
                                bytes += line.len() as u64;
                            }
                        }
                    }
                    break;
                }
                read = reader.read_until(b'\n', &mut line) => read,
            };

            let event = match read {
                Ok(0) => ReaderEvent::Eof,
                Ok(n) => {
                    if let Some(sink) = sink.as_mut() {
                        if let Err(e) = sink.write_all(&line).await {
                            let _ = post(&tx, ReaderEvent::Failed(e), &cancel).await;
                            break;
                        }
                        bytes += n as u64;
                    }
                    ReaderEvent::Line(line)
                }
                Err(e) => ReaderEvent::Failed(e),
            };

            let last = !matches!(event, ReaderEvent::Line(_));
            if !post(&tx, event, &cancel).await || last {
                break;
            }
        }

        ReaderOutcome { sink, bytes }
    })
}

/// Post `event`, giving up when cancelled or when the consumer is gone.
async fn post(tx: &mpsc::Sender<ReaderEvent>, event: ReaderEvent, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

/// Spawn a task logging every line of a stderr stream.
pub(crate) fn spawn_stderr_logger(stderr: BoxedReader, label: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    tracing::warn!(link = %label, stderr = %text.trim_end(), "Remote stderr");
                }
            }
        }
    })
}
