//! `russh` implementation of [`crate::transport::Link`] and
//! [`crate::transport::Dialer`].
//!
//! Host keys are accepted without verification (trust on first use). Do not
//! point this backend at networks where an active attacker is a concern.

pub mod auth;
mod channel;
mod session;

pub use auth::{AuthMaterial, AuthMethod};
pub use session::{ClientHandler, RusshDialer, RusshLink};
