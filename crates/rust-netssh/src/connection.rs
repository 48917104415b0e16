//! Connection establishment and jump-host sharing.
//!
//! [`ConnectionManager`] dials a target directly or through its chain of
//! jump hosts. [`JumpPool`] lets several sessions share one connection to
//! the same jump host.

mod manager;
mod pool;
pub mod retry;

pub use manager::{Connection, ConnectionManager};
pub use pool::{JumpPool, PoolStats};
pub use retry::{RetryPolicy, RetryState};
