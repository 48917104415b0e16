//! Convenient imports for common use.
//!
//! ```ignore
//! use rust_netssh::prelude::*;
//! ```

pub use crate::config::{ConnectionConfig, ExecuteOptions};
pub use crate::connection::{ConnectionManager, JumpPool};
pub use crate::device::DeviceSession;
pub use crate::error::{ErrorKind, NetsshError, Result};
pub use crate::output::{Completion, OutputArtifact};
pub use crate::profile::{Platform, PlatformProfile, SentinelStyle};
pub use crate::transfer::TransferSummary;
