//! Transport backends.
//!
//! Only the `russh` backend exists today; see [`ssh`].

pub mod ssh;
