//! Bridges a `russh` channel onto in-memory pipes.

use russh::ChannelMsg;
use russh::client::Msg;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::transport::{ChannelIo, ExitWatcher};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Spawn a task that owns `channel` and return the local ends.
///
/// Bytes written to `stdin` become channel data and its shutdown becomes
/// channel EOF. Channel data and extended data 1 are copied to `stdout` and
/// `stderr`; both pipes close when the remote side sends EOF or closes. The
/// exit status is published after the channel closes.
pub(crate) fn spawn_channel_pump(channel: russh::Channel<Msg>, label: String) -> ChannelIo {
    let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdout_local, stdout_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_local, stderr_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit) = ExitWatcher::channel();

    tokio::spawn(async move {
        let status = pump(channel, stdin_remote, stdout_remote, stderr_remote, &label).await;
        let _ = exit_tx.send(status);
    });

    ChannelIo {
        stdin: Box::new(stdin_local),
        stdout: Box::new(stdout_local),
        stderr: Box::new(stderr_local),
        exit,
    }
}

async fn pump(
    mut channel: russh::Channel<Msg>,
    mut stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
    label: &str,
) -> Option<u32> {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    let mut stdin_open = true;
    let mut exit_status = None;
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            read = stdin.read(&mut buf), if stdin_open => {
                match read {
                    Ok(0) | Err(_) => {
                        stdin_open = false;
                        if let Err(e) = channel.eof().await {
                            tracing::debug!(link = %label, error = %e, "Sending EOF failed");
                        }
                    }
                    Ok(n) => {
                        if let Err(e) = channel.data(&buf[..n]).await {
                            tracing::debug!(link = %label, error = %e, "Sending data failed");
                            stdin_open = false;
                        }
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { data }) => {
                        forward(&mut stdout, &data).await;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == 1 {
                            forward(&mut stderr, &data).await;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                        exit_status = Some(status);
                    }
                    Some(ChannelMsg::Eof) => {
                        stdout = None;
                        stderr = None;
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    tracing::debug!(link = %label, status = ?exit_status, "Channel closed");
    exit_status
}

/// Copy `data` into `pipe`; a reader that went away drops the pipe.
async fn forward(pipe: &mut Option<DuplexStream>, data: &[u8]) {
    if let Some(writer) = pipe.as_mut() {
        if writer.write_all(data).await.is_err() {
            *pipe = None;
        }
    }
}
