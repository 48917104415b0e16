//! Test utilities for rust-netssh.
//!
//! Scripted stand-ins for the transport seam: a [`FakeDialer`] that hands
//! out [`FakeLink`]s, and scripts describing how their shells and exec
//! channels behave. Nothing here touches the network.

mod fake_dialer;
mod fake_link;
mod scripts;

pub use fake_dialer::{DialAttempt, FakeDialer};
pub use fake_link::FakeLink;
pub use scripts::{ExecScript, ShellReply, ShellScript};
