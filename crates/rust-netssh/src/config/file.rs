//! File-based profile loading.
//!
//! A profile file names a platform and optionally overrides its defaults:
//!
//! ```toml
//! platform = "iosxr"
//!
//! [execute]
//! timeout_secs = 15
//! first_byte_timeout_secs = 120
//!
//! [session]
//! settle_ms = 500
//! shutdown_grace_ms = 2000
//! output_dir = "captures"
//! queue_capacity = 256
//! sentinel = "comment"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NetsshError, Result};
use crate::profile::{PlatformProfile, SentinelStyle};

/// Parsed profile file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileFile {
    /// Platform name; Linux when absent.
    pub platform: Option<String>,
    /// Timer overrides.
    #[serde(default)]
    pub execute: ExecuteSection,
    /// Session overrides.
    #[serde(default)]
    pub session: SessionSection,
}

/// `[execute]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteSection {
    /// Inactivity timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// First-byte timeout in seconds.
    pub first_byte_timeout_secs: Option<u64>,
}

/// `[session]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    /// Settle delay in milliseconds.
    pub settle_ms: Option<u64>,
    /// Shutdown grace in milliseconds.
    pub shutdown_grace_ms: Option<u64>,
    /// Output directory.
    pub output_dir: Option<PathBuf>,
    /// Line queue capacity.
    pub queue_capacity: Option<usize>,
    /// `echo` or `comment`.
    pub sentinel: Option<String>,
}

impl ProfileFile {
    /// Parse TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NetsshError::config(format!("invalid profile: {e}")))
    }

    /// Read and parse a profile file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NetsshError::io_context(format!("reading profile {}", path.display()), e)
        })?;
        Self::parse(&content)
    }

    /// Read a profile file and resolve it into a [`PlatformProfile`].
    pub fn load(path: &Path) -> Result<PlatformProfile> {
        Self::read(path)?.into_profile()
    }

    /// Resolve into a [`PlatformProfile`].
    pub fn into_profile(self) -> Result<PlatformProfile> {
        let mut profile = match self.platform.as_deref() {
            Some(name) => PlatformProfile::for_platform(name.parse()?),
            None => PlatformProfile::default(),
        };

        if let Some(secs) = self.execute.timeout_secs {
            profile.execute.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.execute.first_byte_timeout_secs {
            profile.execute.first_byte_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.session.settle_ms {
            profile.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.session.shutdown_grace_ms {
            profile.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(dir) = self.session.output_dir {
            profile.output_dir = dir;
        }
        if let Some(capacity) = self.session.queue_capacity {
            profile = profile.queue_capacity(capacity);
        }
        if let Some(style) = self.session.sentinel.as_deref() {
            profile.sentinel = parse_sentinel(style)?;
        }

        Ok(profile)
    }
}

fn parse_sentinel(style: &str) -> Result<SentinelStyle> {
    match style.trim().to_ascii_lowercase().as_str() {
        "echo" => Ok(SentinelStyle::Echo),
        "comment" => Ok(SentinelStyle::Comment),
        other => Err(NetsshError::config(format!("unknown sentinel style '{other}'"))),
    }
}
