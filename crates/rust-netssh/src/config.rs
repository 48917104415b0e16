//! Connection and execution configuration.
//!
//! [`ConnectionConfig`] describes one SSH endpoint and, optionally, the jump
//! host in front of it. [`ExecuteOptions`] carries the two timers that decide
//! when a command's output is complete.
//!
//! Platform-wide defaults live in [`crate::profile`]; they can be overlaid
//! from the environment ([`env`]) or from a TOML file ([`file`]).

pub mod env;
pub mod file;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default number of direct dial attempts.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Default bound on a single dial.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default inactivity window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the first byte of output.
pub const DEFAULT_FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(300);

/// One SSH endpoint, optionally reached through a jump host.
///
/// A key path takes precedence over a password. The jump parent is owned, so
/// a chain built from these values is always finite.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host name or address.
    pub host: String,
    /// Port (default 22).
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Password, used when no key path is set.
    pub password: Option<String>,
    /// Path to a private key file.
    pub key_path: Option<PathBuf>,
    /// Passphrase for an encrypted private key.
    pub key_passphrase: Option<String>,
    /// The jump host this endpoint is reached through.
    pub jump: Option<Box<ConnectionConfig>>,
    /// Direct dial attempts; values below 1 are treated as 1.
    pub max_retry: u32,
    /// Bound on each dial.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            key_path: None,
            key_passphrase: None,
            jump: None,
            max_retry: DEFAULT_MAX_RETRY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("jump", &self.jump)
            .field("max_retry", &self.max_retry)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a config for `username@host`.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Set port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set private key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Set the passphrase of an encrypted private key.
    #[must_use]
    pub fn key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(passphrase.into());
        self
    }

    /// Reach this endpoint through `jump`.
    #[must_use]
    pub fn via(mut self, jump: Self) -> Self {
        self.jump = Some(Box::new(jump));
        self
    }

    /// Set the number of direct dial attempts.
    #[must_use]
    pub const fn max_retry(mut self, attempts: u32) -> Self {
        self.max_retry = attempts;
        self
    }

    /// Set the dial timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Attempts actually made by a direct dial.
    #[must_use]
    pub const fn effective_max_retry(&self) -> u32 {
        if self.max_retry == 0 { 1 } else { self.max_retry }
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `username@host:port`, the identity used for pooling and error reports.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Every hop from the outermost jump host down to this endpoint.
    #[must_use]
    pub fn chain(&self) -> Vec<&Self> {
        let mut hops = Vec::new();
        let mut current = Some(self);
        while let Some(cfg) = current {
            hops.push(cfg);
            current = cfg.jump.as_deref();
        }
        hops.reverse();
        hops
    }

    /// Number of hops, counting this endpoint.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.jump.as_ref().map_or(0, |j| j.depth())
    }
}

/// Completion timers for one execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Silence after the last line that counts as completion.
    pub timeout: Duration,
    /// Longest wait for the first line after the command is sent.
    pub first_byte_timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            first_byte_timeout: DEFAULT_FIRST_BYTE_TIMEOUT,
        }
    }
}

impl ExecuteOptions {
    /// Create options with the default timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inactivity window.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the first-byte timeout.
    #[must_use]
    pub const fn first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.first_byte_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_defaults() {
        let cfg = ConnectionConfig::new("router1", "admin");
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.max_retry, 3);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.key(), "admin@router1:22");
        assert_eq!(cfg.address(), "router1:22");
    }

    #[test]
    fn zero_retry_is_one_attempt() {
        let cfg = ConnectionConfig::new("h", "u").max_retry(0);
        assert_eq!(cfg.effective_max_retry(), 1);
        assert_eq!(cfg.max_retry(5).effective_max_retry(), 5);
    }

    #[test]
    fn chain_is_outermost_first() {
        let bastion = ConnectionConfig::new("bastion", "ops");
        let inner = ConnectionConfig::new("inner", "ops").via(bastion);
        let target = ConnectionConfig::new("target", "admin")
            .port(2222)
            .via(inner);

        let hosts: Vec<_> = target.chain().iter().map(|c| c.host.as_str()).collect();
        assert_eq!(hosts, ["bastion", "inner", "target"]);
        assert_eq!(target.depth(), 3);
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = ConnectionConfig::new("h", "u").password("hunter2");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn execute_defaults() {
        let opts = ExecuteOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.first_byte_timeout, Duration::from_secs(300));
        let opts = opts.timeout(Duration::from_secs(2));
        assert_eq!(opts.timeout, Duration::from_secs(2));
    }
}
