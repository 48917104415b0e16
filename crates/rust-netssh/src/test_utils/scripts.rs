//! Scripts driving fake shells and exec channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One step of a shell's reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplyStep {
    Line(String),
    Pause(Duration),
    Hangup,
}

/// What a fake shell prints in response to one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellReply {
    pub(crate) steps: Vec<ReplyStep>,
}

impl ShellReply {
    /// Reply with nothing.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Reply with `lines`, in order.
    #[must_use]
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: lines.into_iter().map(|l| ReplyStep::Line(l.into())).collect(),
        }
    }

    /// Then print one more line.
    #[must_use]
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps.push(ReplyStep::Line(line.into()));
        self
    }

    /// Then go quiet for `duration`.
    #[must_use]
    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(ReplyStep::Pause(duration));
        self
    }

    /// Then drop the session without an exit status.
    #[must_use]
    pub fn hangup(mut self) -> Self {
        self.steps.push(ReplyStep::Hangup);
        self
    }
}

type Responder = dyn Fn(&str) -> ShellReply + Send + Sync;

/// Behaviour of a fake interactive shell.
///
/// Built-in handling: `exit` ends the session with status 0, `echo X` prints
/// `X` with empty quote pairs removed, and lines starting with `!` print
/// nothing. Everything else goes to the responder.
#[derive(Clone)]
pub struct ShellScript {
    pub(crate) responder: Arc<Responder>,
    pub(crate) banner: Vec<String>,
    pub(crate) prompt: Option<String>,
}

impl fmt::Debug for ShellScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellScript")
            .field("banner", &self.banner)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl ShellScript {
    /// A shell answering commands with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> ShellReply + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            banner: Vec::new(),
            prompt: None,
        }
    }

    /// Lines printed as soon as the shell starts.
    #[must_use]
    pub fn banner<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banner = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Echo every input line back prefixed with `prompt`, as a device does.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub(crate) fn respond(&self, command: &str) -> ShellReply {
        (self.responder)(command)
    }
}

/// One step of a scripted exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecStep {
    /// Read one byte from the client; anything else aborts the script.
    Expect(u8),
    /// Write bytes to the client.
    Send(Vec<u8>),
}

/// Behaviour of a fake exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecScript {
    pub(crate) steps: Vec<ExecStep>,
    pub(crate) stderr: Vec<String>,
    pub(crate) exit_status: Option<u32>,
}

impl ExecScript {
    /// The source side of an SCP download of one file.
    #[must_use]
    pub fn scp_source(name: &str, mode: u32, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let header = format!("C{mode:04o} {} {name}\n", content.len());
        Self {
            steps: vec![
                ExecStep::Expect(0),
                ExecStep::Send(header.into_bytes()),
                ExecStep::Expect(0),
                ExecStep::Send(content),
                ExecStep::Send(vec![0]),
                ExecStep::Expect(0),
            ],
            stderr: Vec::new(),
            exit_status: Some(0),
        }
    }

    /// Wait for the client's ready byte, send `bytes` verbatim, then wait
    /// for one more ack before ending.
    #[must_use]
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            steps: vec![
                ExecStep::Expect(0),
                ExecStep::Send(bytes.into()),
                ExecStep::Expect(0),
            ],
            stderr: Vec::new(),
            exit_status: Some(0),
        }
    }

    /// Also print `line` on stderr.
    #[must_use]
    pub fn stderr_line(mut self, line: impl Into<String>) -> Self {
        self.stderr.push(line.into());
        self
    }

    /// Exit status reported when the script ends.
    #[must_use]
    pub const fn exit_status(mut self, status: u32) -> Self {
        self.exit_status = Some(status);
        self
    }
}
