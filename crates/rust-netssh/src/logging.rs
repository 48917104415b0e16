//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and demos call
//! [`init_logging`] once to install a formatter.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::env::{EnvConfig, vars};
use crate::error::{NetsshError, Result};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive such as `rust_netssh=debug`; falls back to
    /// `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Include event targets.
    pub with_target: bool,
}

impl LogConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter directive.
    #[must_use]
    pub fn filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// Set the output format.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Include event targets.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Read `NETSSH_LOG` and `NETSSH_LOG_FORMAT`.
    #[must_use]
    pub fn from_env(env: &EnvConfig) -> Self {
        let format = match env.get(vars::LOG_FORMAT).as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            filter: env.get(vars::LOG),
            format,
            with_target: false,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive)
                .map_err(|e| NetsshError::config(format!("invalid log filter '{directive}': {e}"))),
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
        }
    }
}

/// Install a global tracing subscriber.
///
/// Fails when the filter directive is invalid or a global subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    installed.map_err(|e| NetsshError::config(format!("logging already initialised: {e}")))
}
