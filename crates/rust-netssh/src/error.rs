//! Error types for rust-netssh.
//!
//! Every fallible operation in the crate returns [`NetsshError`]. Wrapping
//! variants ([`NetsshError::Hop`], [`NetsshError::Batch`]) keep the underlying
//! cause reachable through [`std::error::Error::source`] and report its
//! [`ErrorKind`].

use std::time::Duration;

use thiserror::Error;

use crate::output::OutputArtifact;

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or incomplete configuration, or misuse of the API.
    Config,
    /// Authentication material could not be loaded or was rejected.
    Auth,
    /// The remote endpoint could not be reached.
    Connect,
    /// A timer expired before the remote side produced what was needed.
    Timeout,
    /// The remote side violated the expected wire exchange.
    Protocol,
    /// Local or channel I/O failed.
    Io,
}

/// The main error type for rust-netssh operations.
#[derive(Debug, Error)]
pub enum NetsshError {
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed for user '{user}': {reason}")]
    Auth {
        /// The user that failed to authenticate.
        user: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A direct dial exhausted all of its attempts.
    #[error("failed to connect to {target} after {attempts} attempts: {source}")]
    Connect {
        /// The `user@host:port` that was dialled.
        target: String,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: Box<NetsshError>,
    },

    /// A single dial failed.
    #[error("failed to connect to {target}: {reason}")]
    Dial {
        /// The `user@host:port` that was dialled.
        target: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A hop of a jump chain failed.
    #[error("hop {hop} ({target}) failed: {source}")]
    Hop {
        /// 1-based hop position, outermost first.
        hop: usize,
        /// The `user@host:port` of the hop.
        target: String,
        /// The underlying error.
        #[source]
        source: Box<NetsshError>,
    },

    /// A relayed dial did not finish in time.
    #[error("dial to {target} timed out after {waited:?}")]
    DialTimeout {
        /// The `user@host:port` that was dialled.
        target: String,
        /// The configured connect timeout.
        waited: Duration,
    },

    /// The command produced no output before the first-byte timer expired.
    #[error("no output from '{command}' within {waited:?}")]
    NoData {
        /// The command that was sent.
        command: String,
        /// The first-byte timeout that elapsed.
        waited: Duration,
    },

    /// The remote side broke the expected exchange.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of what was received.
        message: String,
    },

    /// Opening or driving an SSH channel failed.
    #[error("SSH channel error: {reason}")]
    Channel {
        /// The reason for the channel error.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    IoWithContext {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A multi-command batch stopped before every command completed.
    #[error("batch stopped at command {index} after {} completed: {source}", completed.len())]
    Batch {
        /// Index of the command that could not be completed.
        index: usize,
        /// Artifacts written for the commands that did complete.
        completed: Vec<OutputArtifact>,
        /// Why the batch stopped.
        #[source]
        source: Box<NetsshError>,
    },

    /// The session has no active connection.
    #[error("session is not connected")]
    NotConnected,
}

/// Result type alias for rust-netssh operations.
pub type Result<T> = std::result::Result<T, NetsshError>;

impl NetsshError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn auth(user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Auth {
            user: user.into(),
            reason: reason.into(),
        }
    }

    /// Create a single-dial error.
    pub fn dial(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dial {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error with the hop it happened on.
    pub fn hop(hop: usize, target: impl Into<String>, source: Self) -> Self {
        Self::Hop {
            hop,
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a channel error.
    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O result with context.
    pub fn with_io_context<T>(result: std::io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::NotConnected => ErrorKind::Config,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Connect { .. } | Self::Dial { .. } => ErrorKind::Connect,
            Self::DialTimeout { .. } | Self::NoData { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Channel { .. } | Self::Io(_) | Self::IoWithContext { .. } => ErrorKind::Io,
            Self::Hop { source, .. } | Self::Batch { source, .. } => source.kind(),
        }
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Check if this is an authentication error.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// The failing hop, if this error came out of a jump chain.
    #[must_use]
    pub const fn hop_index(&self) -> Option<usize> {
        match self {
            Self::Hop { hop, .. } => Some(*hop),
            _ => None,
        }
    }

    /// Artifacts that were completed before a batch stopped.
    #[must_use]
    pub fn completed_artifacts(&self) -> &[OutputArtifact] {
        match self {
            Self::Batch { completed, .. } => completed,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_keeps_last_cause() {
        let err = NetsshError::Connect {
            target: "admin@10.0.0.1:22".into(),
            attempts: 3,
            source: Box::new(NetsshError::dial("admin@10.0.0.1:22", "connection refused")),
        };
        let msg = err.to_string();
        assert!(msg.contains("after 3 attempts"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn hop_reports_inner_kind() {
        let err = NetsshError::hop(
            2,
            "ops@core:22",
            NetsshError::DialTimeout {
                target: "ops@core:22".into(),
                waited: Duration::from_secs(10),
            },
        );
        assert_eq!(err.hop_index(), Some(2));
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("hop 2"));
    }

    #[test]
    fn no_data_is_timeout() {
        let err = NetsshError::NoData {
            command: "show version".into(),
            waited: Duration::from_secs(300),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("show version"));
    }

    #[test]
    fn channel_and_io_share_kind() {
        assert_eq!(NetsshError::channel("refused").kind(), ErrorKind::Io);
        let io = NetsshError::io_context("write output", std::io::Error::other("disk full"));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(io.to_string(), "write output: disk full");
    }

    #[test]
    fn batch_without_artifacts() {
        let err = NetsshError::Batch {
            index: 1,
            completed: Vec::new(),
            source: Box::new(NetsshError::protocol("stream closed")),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.completed_artifacts().is_empty());
        assert!(NetsshError::NotConnected.completed_artifacts().is_empty());
    }

    #[test]
    fn auth_predicate() {
        let err = NetsshError::auth("root", "key rejected");
        assert!(err.is_auth());
        assert!(!err.is_timeout());
        assert_eq!(NetsshError::NotConnected.kind(), ErrorKind::Config);
    }
}
