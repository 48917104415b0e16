//! Single-command execution with inactivity-based completion.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::reader::{ReaderEvent, spawn_reader, spawn_stderr_logger};
use super::{await_exit, send_exit, send_line};
use crate::config::ExecuteOptions;
use crate::error::{NetsshError, Result};
use crate::output::{Completion, OutputArtifact, OutputStore};
use crate::profile::PlatformProfile;
use crate::transport::{BoxedWriter, ChannelIo, Link, PtyRequest};

/// Runs one command in a fresh PTY shell and captures its output to a file.
///
/// Completion is heuristic: the output is considered whole once the stream
/// ends or no line has arrived for [`ExecuteOptions::timeout`]. The wait for
/// the first line is bounded separately by
/// [`ExecuteOptions::first_byte_timeout`]. A command that pauses longer than
/// the inactivity window will be cut short.
#[derive(Debug, Clone)]
pub struct InteractiveExecutor {
    pty: PtyRequest,
    settle_delay: Duration,
    shutdown_grace: Duration,
    queue_capacity: usize,
    store: OutputStore,
}

impl InteractiveExecutor {
    /// Executor using the PTY, delays and output directory of `profile`.
    #[must_use]
    pub fn new(profile: &PlatformProfile) -> Self {
        Self {
            pty: profile.pty.clone(),
            settle_delay: profile.settle_delay,
            shutdown_grace: profile.shutdown_grace,
            queue_capacity: profile.queue_capacity.max(1),
            store: OutputStore::new(&profile.output_dir),
        }
    }

    /// Run `command` on `link`.
    ///
    /// Returns [`NetsshError::NoData`] when nothing arrives before the
    /// first-byte timeout; the output file is removed in that case.
    pub async fn execute(
        &self,
        link: &dyn Link,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<OutputArtifact> {
        let label = link.label().to_string();
        let ChannelIo {
            mut stdin,
            stdout,
            stderr,
            exit,
        } = link.open_shell(&self.pty).await?;
        let (path, file) = self.store.create_single().await?;

        tracing::info!(link = %label, command = %command, path = %path.display(), "Executing command");

        spawn_stderr_logger(stderr, label.clone());
        let (tx, mut rx) = mpsc::channel(self.queue_capacity);
        let cancel = CancellationToken::new();
        let reader = spawn_reader(stdout, tx, Some(BufWriter::new(file)), cancel.clone());

        let outcome = self.drive(&mut stdin, &mut rx, command, options).await;

        cancel.cancel();
        drop(rx);
        let flushed = match reader.await {
            Ok(captured) => flush(captured.sink, &path)
                .await
                .map(|()| captured.bytes),
            Err(e) => Err(NetsshError::channel(format!("output reader failed: {e}"))),
        };

        send_exit(&mut stdin, &label).await;
        drop(stdin);
        await_exit(exit, self.shutdown_grace, &label).await;

        match (outcome, flushed) {
            (Ok(completion), Ok(bytes)) => {
                tracing::info!(link = %label, bytes, completion = %completion, "Command finished");
                Ok(OutputArtifact {
                    path,
                    index: None,
                    bytes,
                    completion,
                })
            }
            (Err(err), _) | (Ok(_), Err(err)) => {
                discard(&path).await;
                tracing::error!(link = %label, command = %command, error = %err, "Command failed");
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        stdin: &mut BoxedWriter,
        rx: &mut mpsc::Receiver<ReaderEvent>,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<Completion> {
        // Wake the shell and let banners and prompts arrive; they are
        // captured like any other output.
        send_line(stdin, "").await?;
        let settle = tokio::time::sleep(self.settle_delay);
        tokio::pin!(settle);
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(ReaderEvent::Line(_)) => {}
                    Some(ReaderEvent::Failed(e)) => {
                        return Err(NetsshError::io_context("reading shell output", e));
                    }
                    Some(ReaderEvent::Eof) | None => {
                        return Err(NetsshError::channel("shell closed before the command was sent"));
                    }
                },
                () = &mut settle => break,
            }
        }

        send_line(stdin, command).await?;

        let timer = tokio::time::sleep(options.first_byte_timeout);
        tokio::pin!(timer);
        let mut received = false;
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(ReaderEvent::Line(_)) => {
                        received = true;
                        timer.as_mut().reset(Instant::now() + options.timeout);
                    }
                    Some(ReaderEvent::Eof) | None => return Ok(Completion::EndOfStream),
                    Some(ReaderEvent::Failed(e)) => {
                        return Err(NetsshError::io_context("reading command output", e));
                    }
                },
                () = &mut timer => {
                    return if received {
                        Ok(Completion::Idle)
                    } else {
                        Err(NetsshError::NoData {
                            command: command.to_string(),
                            waited: options.first_byte_timeout,
                        })
                    };
                }
            }
        }
    }
}

async fn flush(sink: Option<BufWriter<tokio::fs::File>>, path: &Path) -> Result<()> {
    let Some(mut sink) = sink else {
        return Ok(());
    };
    NetsshError::with_io_context(sink.flush().await, format!("writing {}", path.display()))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "Could not remove output file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{FakeLink, ShellReply, ShellScript};

    fn profile(dir: &Path) -> PlatformProfile {
        PlatformProfile::default()
            .output_dir(dir)
            .settle_delay(Duration::from_millis(20))
            .shutdown_grace(Duration::from_millis(200))
    }

    fn options() -> ExecuteOptions {
        ExecuteOptions::new()
            .timeout(Duration::from_millis(300))
            .first_byte_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn captures_lines_until_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = FakeLink::new("admin@r1:22").with_shell(
            ShellScript::new(|cmd| match cmd {
                "show clock" => ShellReply::lines(["a", "b"])
                    .pause(Duration::from_millis(100))
                    .line("c"),
                _ => ShellReply::silent(),
            })
            .banner(["Welcome to r1"]),
        );

        let artifact = InteractiveExecutor::new(&profile(dir.path()))
            .execute(&link, "show clock", options())
            .await
            .expect("execute");

        assert_eq!(artifact.completion, Completion::Idle);
        assert!(artifact.index.is_none());
        let text = artifact.read_to_string().await.expect("read");
        assert!(text.ends_with("a\nb\nc\n"), "unexpected output: {text:?}");
        assert!(text.contains("Welcome to r1"));
        assert_eq!(artifact.bytes, text.len() as u64);
        assert_eq!(link.shell_inputs(), ["", "show clock", "exit"]);
    }

    #[tokio::test]
    async fn stream_end_completes_early() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = FakeLink::new("admin@r1:22").with_shell(ShellScript::new(|_| {
            ShellReply::lines(["bye"]).hangup()
        }));

        let started = std::time::Instant::now();
        let artifact = InteractiveExecutor::new(&profile(dir.path()))
            .execute(&link, "reload", options())
            .await
            .expect("execute");

        assert_eq!(artifact.completion, Completion::EndOfStream);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(artifact.read_to_string().await.expect("read"), "bye\n");
    }

    #[tokio::test]
    async fn silence_is_no_data_and_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = FakeLink::new("admin@r1:22").with_shell(ShellScript::new(|_| ShellReply::silent()));

        let opts = options().first_byte_timeout(Duration::from_millis(200));
        let err = InteractiveExecutor::new(&profile(dir.path()))
            .execute(&link, "show nothing", opts)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(err, NetsshError::NoData { .. }));
        let leftovers = std::fs::read_dir(dir.path()).expect("dir").count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn first_byte_window_is_separate_from_inactivity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = FakeLink::new("admin@r1:22").with_shell(ShellScript::new(|_| {
            ShellReply::silent()
                .pause(Duration::from_millis(500))
                .line("late but fine")
        }));

        let artifact = InteractiveExecutor::new(&profile(dir.path()))
            .execute(&link, "show tech", options())
            .await
            .expect("execute");

        assert_eq!(artifact.completion, Completion::Idle);
        assert!(artifact.read_to_string().await.expect("read").contains("late but fine"));
    }

    #[tokio::test]
    async fn missing_shell_is_channel_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = FakeLink::new("admin@r1:22");

        let err = InteractiveExecutor::new(&profile(dir.path()))
            .execute(&link, "show version", options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
    }
}
