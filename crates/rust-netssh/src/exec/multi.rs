//! Batched execution in one shared shell, delimited by sentinels.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::reader::{ReaderEvent, spawn_reader, spawn_stderr_logger};
use super::sentinel::{self, Sentinel};
use super::{await_exit, send_exit, send_line};
use crate::config::ExecuteOptions;
use crate::error::{NetsshError, Result};
use crate::output::{Completion, OutputArtifact, OutputStore};
use crate::profile::{PlatformProfile, SentinelStyle};
use crate::transport::{BoxedWriter, ChannelIo, Link, PtyRequest};

/// Runs a list of commands in one PTY shell, one output file per command.
///
/// Each command is followed by a sentinel line carrying a fresh nonce. The
/// command's output is everything between sending it and seeing its
/// sentinel; marker lines themselves are never written. If the sentinel does
/// not show up within the inactivity window, the output collected so far is
/// kept and marked [`Completion::IdleBeforeSentinel`].
#[derive(Debug, Clone)]
pub struct MultiCommandExecutor {
    pty: PtyRequest,
    settle_delay: Duration,
    shutdown_grace: Duration,
    queue_capacity: usize,
    sentinel: SentinelStyle,
    store: OutputStore,
}

/// How collection of one command ended.
struct Collected {
    output: Vec<u8>,
    completion: Completion,
}

impl MultiCommandExecutor {
    /// Executor using the PTY, delays, sentinel style and output directory
    /// of `profile`.
    #[must_use]
    pub fn new(profile: &PlatformProfile) -> Self {
        Self {
            pty: profile.pty.clone(),
            settle_delay: profile.settle_delay,
            shutdown_grace: profile.shutdown_grace,
            queue_capacity: profile.queue_capacity.max(1),
            sentinel: profile.sentinel,
            store: OutputStore::new(&profile.output_dir),
        }
    }

    /// Run `commands` in order on `link`.
    ///
    /// Returns one artifact per command, in order. If the shell closes or a
    /// write fails part way, the error is [`NetsshError::Batch`] carrying
    /// the artifacts already written. An empty list does no I/O.
    pub async fn execute<S: AsRef<str>>(
        &self,
        link: &dyn Link,
        commands: &[S],
        options: ExecuteOptions,
    ) -> Result<Vec<OutputArtifact>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let label = link.label().to_string();
        let ChannelIo {
            mut stdin,
            stdout,
            stderr,
            exit,
        } = link.open_shell(&self.pty).await?;

        tracing::info!(link = %label, commands = commands.len(), "Executing command batch");

        spawn_stderr_logger(stderr, label.clone());
        let (tx, mut rx) = mpsc::channel(self.queue_capacity);
        let cancel = CancellationToken::new();
        let reader = spawn_reader(stdout, tx, None, cancel.clone());

        let result = self.run(&mut stdin, &mut rx, commands, options, &label).await;

        send_exit(&mut stdin, &label).await;
        drop(stdin);
        drain(&mut rx, self.shutdown_grace).await;
        cancel.cancel();
        drop(rx);
        if let Err(e) = reader.await {
            tracing::debug!(link = %label, error = %e, "Output reader ended abnormally");
        }
        await_exit(exit, self.shutdown_grace, &label).await;

        match &result {
            Ok(artifacts) => {
                let partial = artifacts.iter().filter(|a| !a.completion.is_complete()).count();
                tracing::info!(link = %label, commands = artifacts.len(), partial, "Command batch finished");
            }
            Err(err) => tracing::error!(link = %label, error = %err, "Command batch failed"),
        }
        result
    }

    async fn run<S: AsRef<str>>(
        &self,
        stdin: &mut BoxedWriter,
        rx: &mut mpsc::Receiver<ReaderEvent>,
        commands: &[S],
        options: ExecuteOptions,
        label: &str,
    ) -> Result<Vec<OutputArtifact>> {
        let mut completed = Vec::with_capacity(commands.len());

        // Banners and prompts before the first command belong to no command.
        if let Err(err) = self.settle(stdin, rx).await {
            return Err(batch(0, completed, err));
        }

        for (index, command) in commands.iter().enumerate() {
            let command = command.as_ref();
            let marker = Sentinel::new(index, self.sentinel);

            let sent = match send_line(stdin, command).await {
                Ok(()) => send_line(stdin, &marker.command()).await,
                Err(err) => Err(err),
            };
            if let Err(err) = sent {
                return Err(batch(index, completed, err));
            }
            tracing::debug!(link = %label, index, command = %command, sentinel = %marker.marker(), "Command sent");

            let collected = match collect(rx, &marker, options).await {
                Ok(collected) => collected,
                Err(err) => return Err(batch(index, completed, err)),
            };
            let completion = collected.completion;

            match self.write(index, &collected.output, completion).await {
                Ok(artifact) => {
                    if completion == Completion::IdleBeforeSentinel {
                        tracing::warn!(link = %label, index, command = %command, "No sentinel before inactivity timeout; output may be truncated");
                    }
                    completed.push(artifact);
                }
                Err(err) => return Err(batch(index, completed, err)),
            }

            if completion == Completion::StreamClosed {
                let next = index + 1;
                if next < commands.len() {
                    let err = NetsshError::channel("shell closed before the batch finished");
                    return Err(batch(next, completed, err));
                }
            }
        }

        Ok(completed)
    }

    async fn settle(&self, stdin: &mut BoxedWriter, rx: &mut mpsc::Receiver<ReaderEvent>) -> Result<()> {
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
                        return Err(NetsshError::channel("shell closed before the first command was sent"));
                    }
                },
                () = &mut settle => return Ok(()),
            }
        }
    }

    async fn write(&self, index: usize, output: &[u8], completion: Completion) -> Result<OutputArtifact> {
        let (path, mut file) = self.store.create_indexed(index).await?;
        let context = format!("writing {}", path.display());
        NetsshError::with_io_context(file.write_all(output).await, context.as_str())?;
        NetsshError::with_io_context(file.flush().await, context)?;
        Ok(OutputArtifact {
            path,
            index: Some(index),
            bytes: output.len() as u64,
            completion,
        })
    }
}

/// Gather the output of one command until its sentinel, silence, or the end
/// of the stream.
async fn collect(
    rx: &mut mpsc::Receiver<ReaderEvent>,
    marker: &Sentinel,
    options: ExecuteOptions,
) -> Result<Collected> {
    let mut output = Vec::new();
    let timer = tokio::time::sleep(options.first_byte_timeout);
    tokio::pin!(timer);

    let completion = loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(ReaderEvent::Line(line)) => {
                    let text = String::from_utf8_lossy(&line);
                    if marker.is_boundary(&text) {
                        break Completion::Sentinel;
                    }
                    if sentinel::appears_in(&text) {
                        continue;
                    }
                    output.extend_from_slice(&line);
                    timer.as_mut().reset(Instant::now() + options.timeout);
                }
                Some(ReaderEvent::Failed(e)) => {
                    return Err(NetsshError::io_context("reading command output", e));
                }
                Some(ReaderEvent::Eof) | None => break Completion::StreamClosed,
            },
            () = &mut timer => break Completion::IdleBeforeSentinel,
        }
    };

    Ok(Collected { output, completion })
}

/// Discard output until the shell closes or `grace` runs out.
async fn drain(rx: &mut mpsc::Receiver<ReaderEvent>, grace: Duration) {
    let _ = tokio::time::timeout(grace, async {
        while let Some(event) = rx.recv().await {
            if !matches!(event, ReaderEvent::Line(_)) {
                break;
            }
        }
    })
    .await;
}

fn batch(index: usize, completed: Vec<OutputArtifact>, source: NetsshError) -> NetsshError {
    NetsshError::Batch {
        index,
        completed,
        source: Box::new(source),
    }
}
