//! Per-platform session defaults.
//!
//! A [`PlatformProfile`] is the table row the execution layer consults for
//! timers, the settle delay after the shell starts, the sentinel style used
//! to delimit batched commands, and where output files land.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::ExecuteOptions;
use crate::config::env::{EnvConfig, vars};
use crate::error::NetsshError;
use crate::transport::PtyRequest;

/// Default directory for captured output.
pub const DEFAULT_OUTPUT_DIR: &str = "ssh_command_outputs";

/// Default pause after the first newline, letting banners and prompts arrive.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default wait for a session to exit after `exit` is sent.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Default capacity of the line queue between reader and consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Supported device platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Cisco IOS-XR.
    CiscoIosXr,
    /// Cisco IOS-XE.
    CiscoIosXe,
    /// Cisco NX-OS.
    CiscoNxos,
    /// Generic Linux host.
    Linux,
}

impl Platform {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CiscoIosXr => "iosxr",
            Self::CiscoIosXe => "iosxe",
            Self::CiscoNxos => "nxos",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = NetsshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "iosxr" | "ciscoiosxr" => Ok(Self::CiscoIosXr),
            "iosxe" | "ciscoiosxe" => Ok(Self::CiscoIosXe),
            "nxos" | "cisconxos" => Ok(Self::CiscoNxos),
            "linux" => Ok(Self::Linux),
            other => Err(NetsshError::config(format!("unknown platform '{other}'"))),
        }
    }
}

/// How batched commands are delimited in a shared shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelStyle {
    /// `echo` the marker with its halves split by an empty quote pair, so the
    /// echoed command line never equals the marker.
    Echo,
    /// Send the marker as a `!` comment line; the device echoes it after its
    /// prompt.
    Comment,
}

/// Defaults for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    /// The platform.
    pub platform: Platform,
    /// Timers used when the caller passes none.
    pub execute: ExecuteOptions,
    /// Pause after the initial newline.
    pub settle_delay: Duration,
    /// Wait for the session to exit after `exit`.
    pub shutdown_grace: Duration,
    /// Sentinel style for batches.
    pub sentinel: SentinelStyle,
    /// Directory receiving output files.
    pub output_dir: PathBuf,
    /// Line queue capacity.
    pub queue_capacity: usize,
    /// PTY requested for interactive shells.
    pub pty: PtyRequest,
}

impl PlatformProfile {
    /// Built-in defaults for `platform`.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        let sentinel = match platform {
            Platform::CiscoIosXr | Platform::CiscoIosXe | Platform::CiscoNxos => SentinelStyle::Comment,
            Platform::Linux => SentinelStyle::Echo,
        };
        Self {
            platform,
            execute: ExecuteOptions::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            sentinel,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pty: PtyRequest::default(),
        }
    }

    /// Set default timers.
    #[must_use]
    pub const fn execute(mut self, options: ExecuteOptions) -> Self {
        self.execute = options;
        self
    }

    /// Set the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the shutdown grace.
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the sentinel style.
    #[must_use]
    pub const fn sentinel(mut self, style: SentinelStyle) -> Self {
        self.sentinel = style;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the line queue capacity (at least 1).
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Overlay `NETSSH_*` variables read through `env`.
    #[must_use]
    pub fn apply_env(mut self, env: &EnvConfig) -> Self {
        if let Some(timeout) = env.duration_secs(vars::TIMEOUT_SECS) {
            self.execute.timeout = timeout;
        }
        if let Some(timeout) = env.duration_secs(vars::FIRST_BYTE_TIMEOUT_SECS) {
            self.execute.first_byte_timeout = timeout;
        }
        if let Some(delay) = env.duration_millis(vars::SETTLE_MS) {
            self.settle_delay = delay;
        }
        if let Some(dir) = env.get(vars::OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    /// Profile for the platform named by `NETSSH_PLATFORM` (Linux when
    /// unset), with the other variables overlaid.
    pub fn from_env(env: &EnvConfig) -> crate::error::Result<Self> {
        let platform = match env.get(vars::PLATFORM) {
            Some(name) => name.parse()?,
            None => Platform::Linux,
        };
        Ok(Self::for_platform(platform).apply_env(env))
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::for_platform(Platform::Linux)
    }
}
