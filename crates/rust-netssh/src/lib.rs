//! rust-netssh: SSH session automation for network devices
//!
//! This crate drives interactive SSH shells on routers, switches and Linux
//! hosts, captures each command's output to a local file, reaches devices
//! through chains of jump hosts, and downloads files over SCP.
//!
//! # Features
//!
//! - **Jump-host chains** dialled outermost first, with bounded retry on the first hop
//! - **Shared jump connections** through a reference-counted [`JumpPool`]
//! - **Interactive execution** completed by an inactivity timer
//! - **Batched execution** in one shell, split by per-command sentinels
//! - **SCP download** of single files
//! - **Platform profiles** for Cisco IOS-XR, IOS-XE, NX-OS and Linux
//!
//! Completion of interactive commands is heuristic: a device gives no signal
//! that a command has finished, so a quiet period is taken as the end.
//!
//! # Example
//!
//! ```ignore
//! use rust_netssh::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let target = ConnectionConfig::new("10.0.0.1", "admin")
//!         .password("secret")
//!         .via(ConnectionConfig::new("bastion.example.net", "ops").key_path("/home/ops/.ssh/id_ed25519"));
//!
//!     let mut session = DeviceSession::new(PlatformProfile::for_platform(Platform::CiscoIosXr));
//!     session.connect(&target).await?;
//!     let outputs = session.execute_multiple(&["show clock", "show version"], None).await?;
//!     for artifact in &outputs {
//!         println!("{}", artifact.path.display());
//!     }
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

// Configuration and errors
pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod profile;

// Transport
pub mod backend;
pub mod connection;
pub mod transport;

// Execution
pub mod device;
pub mod exec;
pub mod output;
pub mod transfer;

pub use backend::ssh::{AuthMaterial, AuthMethod, RusshDialer, RusshLink};
pub use config::env::EnvConfig;
pub use config::file::ProfileFile;
pub use config::{ConnectionConfig, ExecuteOptions};
pub use connection::{Connection, ConnectionManager, JumpPool, PoolStats, RetryPolicy};
pub use device::DeviceSession;
pub use error::{ErrorKind, NetsshError, Result};
pub use exec::{InteractiveExecutor, MultiCommandExecutor};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use output::{Completion, OutputArtifact, OutputStore};
pub use profile::{Platform, PlatformProfile, SentinelStyle};
pub use transfer::{FileTransferClient, TransferSummary};
pub use transport::{ChannelIo, Dialer, ExitWatcher, Link, PtyRequest};

// Test utilities
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{DialAttempt, ExecScript, FakeDialer, FakeLink, ShellReply, ShellScript};
