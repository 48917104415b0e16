//! Transport seam between the session logic and the SSH library.
//!
//! The executors and the connection layer only see [`Link`] and [`Dialer`].
//! [`crate::backend::ssh`] implements them on top of `russh`; the scripted
//! fakes in `test_utils` implement them for tests.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::backend::ssh::auth::AuthMaterial;
use crate::config::ConnectionConfig;
use crate::error::Result;

/// Write half of a channel.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a channel.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A bidirectional byte stream that can carry a nested SSH connection.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A relayed TCP stream opened through a jump link.
pub type BoxedTunnel = Box<dyn TunnelStream>;

/// Resolves to the remote exit status once the channel has finished.
#[derive(Debug)]
pub struct ExitWatcher(oneshot::Receiver<Option<u32>>);

impl ExitWatcher {
    /// Create a watcher and the sender that completes it.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<Option<u32>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// A watcher that is already complete.
    #[must_use]
    pub fn ready(status: Option<u32>) -> Self {
        let (tx, watcher) = Self::channel();
        let _ = tx.send(status);
        watcher
    }

    /// Wait for the channel to finish.
    ///
    /// `None` means the channel went away without reporting a status.
    pub async fn wait(self) -> Option<u32> {
        self.0.await.ok().flatten()
    }
}

/// The local ends of an open channel.
pub struct ChannelIo {
    /// Data written here is sent to the remote side; shutting it down sends EOF.
    pub stdin: BoxedWriter,
    /// Remote standard output.
    pub stdout: BoxedReader,
    /// Remote standard error.
    pub stderr: BoxedReader,
    /// Remote exit status.
    pub exit: ExitWatcher,
}

impl fmt::Debug for ChannelIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelIo").finish_non_exhaustive()
    }
}

/// Pseudo-terminal requested for interactive shells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Terminal type.
    pub term: String,
    /// Width in columns.
    pub cols: u32,
    /// Height in rows.
    pub rows: u32,
    /// Whether the remote tty echoes input.
    pub echo: bool,
    /// Input and output baud rate.
    pub speed: u32,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "vt100".to_string(),
            cols: 80,
            rows: 40,
            echo: false,
            speed: 14_400,
        }
    }
}

/// An authenticated SSH connection.
pub trait Link: Send + Sync + fmt::Debug {
    /// `user@host:port` of the remote end.
    fn label(&self) -> &str;

    /// Open a session channel with a PTY and start a shell on it.
    fn open_shell<'a>(&'a self, pty: &'a PtyRequest) -> BoxFuture<'a, Result<ChannelIo>>;

    /// Open a session channel running `command`, without a PTY.
    fn open_exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ChannelIo>>;

    /// Open a TCP stream to `host:port` relayed by the remote end.
    fn open_tunnel<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, Result<BoxedTunnel>>;

    /// Disconnect. Errors are logged, not returned.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Establishes authenticated links.
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Dial `target` directly. One attempt; the caller bounds and retries it.
    fn dial<'a>(
        &'a self,
        target: &'a ConnectionConfig,
        auth: &'a AuthMaterial,
    ) -> BoxFuture<'a, Result<Arc<dyn Link>>>;

    /// Dial `target` through `jump`. Cancelling `cancel` abandons the attempt.
    fn dial_via<'a>(
        &'a self,
        jump: Arc<dyn Link>,
        target: &'a ConnectionConfig,
        auth: &'a AuthMaterial,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<Arc<dyn Link>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_watcher_reports_status() {
        let (tx, watcher) = ExitWatcher::channel();
        tx.send(Some(0)).expect("send");
        assert_eq!(watcher.wait().await, Some(0));
    }

    #[tokio::test]
    async fn dropped_sender_means_no_status() {
        let (tx, watcher) = ExitWatcher::channel();
        drop(tx);
        assert_eq!(watcher.wait().await, None);
        assert_eq!(ExitWatcher::ready(Some(3)).wait().await, Some(3));
    }

    #[test]
    fn default_pty() {
        let pty = PtyRequest::default();
        assert_eq!((pty.term.as_str(), pty.cols, pty.rows), ("vt100", 80, 40));
        assert!(!pty.echo);
    }
}
