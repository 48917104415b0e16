//! Command execution over interactive shells.
//!
//! Network devices give no machine-readable signal that a command has
//! finished. [`InteractiveExecutor`] treats a quiet period as completion;
//! [`MultiCommandExecutor`] runs a batch in one shell and follows each
//! command with a unique sentinel line.
//!
//! Both read the shell through one reader task feeding a bounded queue, and
//! consume that queue from a single loop racing a resettable timer.

mod interactive;
mod multi;
pub(crate) mod reader;
mod sentinel;

pub use interactive::InteractiveExecutor;
pub use multi::MultiCommandExecutor;

use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::{NetsshError, Result};
use crate::transport::{BoxedWriter, ExitWatcher};

/// Write `line` and a newline to the shell.
async fn send_line(stdin: &mut BoxedWriter, line: &str) -> Result<()> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    NetsshError::with_io_context(stdin.write_all(&bytes).await, "writing to shell")?;
    NetsshError::with_io_context(stdin.flush().await, "writing to shell")
}

/// Ask the shell to exit and close its input. Failures are only logged; the
/// remote side may already be gone.
async fn send_exit(stdin: &mut BoxedWriter, label: &str) {
    if let Err(e) = send_line(stdin, "exit").await {
        tracing::debug!(link = %label, error = %e, "Could not send exit");
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(link = %label, error = %e, "Could not close shell input");
    }
}

/// Wait up to `grace` for the channel to finish, logging anything unusual.
pub(crate) async fn await_exit(exit: ExitWatcher, grace: Duration, label: &str) {
    match tokio::time::timeout(grace, exit.wait()).await {
        Ok(Some(0)) => tracing::debug!(link = %label, "Remote side exited"),
        Ok(Some(status)) => tracing::warn!(link = %label, status, "Remote side exited with non-zero status"),
        Ok(None) => tracing::warn!(link = %label, "Channel closed without an exit status"),
        Err(_) => tracing::warn!(link = %label, grace = ?grace, "Remote side did not exit within grace period"),
    }
}
