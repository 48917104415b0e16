//! Scripted in-memory link.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::oneshot;

use super::scripts::{ExecScript, ExecStep, ReplyStep, ShellScript};
use crate::error::{NetsshError, Result};
use crate::transport::{BoxedTunnel, ChannelIo, ExitWatcher, Link, PtyRequest};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Record {
    closes: usize,
    tunnels: usize,
    shell_inputs: Vec<String>,
    exec_commands: Vec<String>,
}

/// A [`Link`] whose channels are driven by scripts.
///
/// Opening a shell without a [`ShellScript`], or an exec channel without an
/// [`ExecScript`], fails with a channel error.
#[derive(Debug)]
pub struct FakeLink {
    label: String,
    shell: Option<ShellScript>,
    exec: Option<ExecScript>,
    record: Arc<Mutex<Record>>,
}

impl FakeLink {
    /// A link labelled `label` with no scripts.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            shell: None,
            exec: None,
            record: Arc::new(Mutex::new(Record::default())),
        }
    }

    /// Serve shells with `script`.
    #[must_use]
    pub fn with_shell(mut self, script: ShellScript) -> Self {
        self.shell = Some(script);
        self
    }

    /// Serve exec channels with `script`.
    #[must_use]
    pub fn with_exec(mut self, script: ExecScript) -> Self {
        self.exec = Some(script);
        self
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Times [`Link::close`] was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.record().closes
    }

    /// Tunnels opened through this link.
    #[must_use]
    pub fn tunnel_count(&self) -> usize {
        self.record().tunnels
    }

    /// Every line written to shells on this link, in order.
    #[must_use]
    pub fn shell_inputs(&self) -> Vec<String> {
        self.record().shell_inputs.clone()
    }

    /// Every command passed to [`Link::open_exec`].
    #[must_use]
    pub fn exec_commands(&self) -> Vec<String> {
        self.record().exec_commands.clone()
    }
}

impl Link for FakeLink {
    fn label(&self) -> &str {
        &self.label
    }

    fn open_shell<'a>(&'a self, _pty: &'a PtyRequest) -> BoxFuture<'a, Result<ChannelIo>> {
        Box::pin(async move {
            let Some(script) = self.shell.clone() else {
                return Err(NetsshError::channel(format!("{} refused the shell request", self.label)));
            };
            let (io, remote) = pipes();
            tokio::spawn(run_shell(script, remote, Arc::clone(&self.record)));
            Ok(io)
        })
    }

    fn open_exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ChannelIo>> {
        Box::pin(async move {
            self.record().exec_commands.push(command.to_string());
            let Some(script) = self.exec.clone() else {
                return Err(NetsshError::channel(format!("{} refused the exec request", self.label)));
            };
            let (io, remote) = pipes();
            tokio::spawn(run_exec(script, remote));
            Ok(io)
        })
    }

    fn open_tunnel<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, Result<BoxedTunnel>> {
        Box::pin(async move {
            self.record().tunnels += 1;
            let (local, _remote) = tokio::io::duplex(PIPE_CAPACITY);
            Ok(Box::new(local) as BoxedTunnel)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.record().closes += 1;
        })
    }
}

/// The remote ends of a fake channel.
struct Remote {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
    exit: oneshot::Sender<Option<u32>>,
}

fn pipes() -> (ChannelIo, Remote) {
    let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit) = ExitWatcher::channel();
    (
        ChannelIo {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
            exit,
        },
        Remote {
            stdin: stdin_remote,
            stdout: stdout_remote,
            stderr: stderr_remote,
            exit: exit_tx,
        },
    )
}

async fn write_line(out: &mut DuplexStream, line: &str) {
    let _ = out.write_all(format!("{line}\n").as_bytes()).await;
}

async fn run_shell(script: ShellScript, remote: Remote, record: Arc<Mutex<Record>>) {
    let Remote {
        stdin,
        mut stdout,
        stderr,
        exit,
    } = remote;
    drop(stderr);

    for line in &script.banner {
        write_line(&mut stdout, line).await;
    }

    let mut lines = BufReader::new(stdin).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shell_inputs
            .push(line.clone());
        if let Some(prompt) = &script.prompt {
            write_line(&mut stdout, &format!("{prompt}{line}")).await;
        }

        let command = line.trim();
        if command == "exit" {
            let _ = exit.send(Some(0));
            return;
        }
        if command.is_empty() || command.starts_with('!') {
            continue;
        }
        if let Some(text) = command.strip_prefix("echo ") {
            write_line(&mut stdout, &text.replace("\"\"", "")).await;
            continue;
        }

        for step in script.respond(command).steps {
            match step {
                ReplyStep::Line(text) => write_line(&mut stdout, &text).await,
                ReplyStep::Pause(duration) => tokio::time::sleep(duration).await,
                ReplyStep::Hangup => return,
            }
        }
    }
}

async fn run_exec(script: ExecScript, remote: Remote) {
    let Remote {
        mut stdin,
        mut stdout,
        mut stderr,
        exit,
    } = remote;

    for line in &script.stderr {
        write_line(&mut stderr, line).await;
    }
    drop(stderr);

    for step in script.steps {
        match step {
            ExecStep::Expect(byte) => match stdin.read_u8().await {
                Ok(got) if got == byte => {}
                _ => {
                    let _ = exit.send(Some(1));
                    return;
                }
            },
            ExecStep::Send(bytes) => {
                let _ = stdout.write_all(&bytes).await;
            }
        }
    }
    let _ = exit.send(script.exit_status);
}
