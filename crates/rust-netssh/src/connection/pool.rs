//! Reference-counted sharing of jump-host connections.
//!
//! Sessions that reach different targets through the same jump host share
//! one connection to it. Each [`JumpPool::get`] takes a reference and each
//! [`JumpPool::release`] gives one back; the connection is closed when the
//! last reference is released.
//!
//! # Example
//!
//! ```ignore
//! let pool = JumpPool::new(ConnectionManager::default());
//! let bastion = ConnectionConfig::new("bastion", "ops").password("secret");
//!
//! let jump = pool.get(&bastion).await?;
//! let conn = manager.connect_via(jump, &target).await?;
//! // ...
//! conn.close().await;
//! pool.release(&bastion).await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::manager::{Connection, ConnectionManager};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::transport::Link;

/// A pooled jump connection and its reference count.
#[derive(Debug)]
struct SharedJump {
    connection: Connection,
    refs: Mutex<usize>,
    closed: AtomicBool,
}

impl SharedJump {
    fn new(connection: Connection) -> Self {
        Self {
            connection,
            refs: Mutex::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> usize {
        let mut refs = self.refs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *refs += 1;
        *refs
    }

    /// Drop one reference, never going below zero.
    fn release(&self) -> usize {
        let mut refs = self.refs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *refs = refs.saturating_sub(1);
        *refs
    }

    fn refs(&self) -> usize {
        *self.refs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.connection.close().await;
        }
    }
}

/// Pool of shared jump connections, keyed by `user@host:port`.
#[derive(Debug)]
pub struct JumpPool {
    manager: ConnectionManager,
    entries: tokio::sync::Mutex<HashMap<String, Arc<SharedJump>>>,
}

impl JumpPool {
    /// Create a pool that opens connections with `manager`.
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            entries: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Take a reference to the connection for `cfg`, opening it on first use.
    ///
    /// The map lock is held while connecting, so concurrent first requests
    /// for a key open exactly one connection.
    pub async fn get(&self, cfg: &ConnectionConfig) -> Result<Arc<dyn Link>> {
        let key = cfg.key();
        let mut entries = self.entries.lock().await;

        let entry = match entries.get(&key) {
            Some(entry) => Arc::clone(entry),
            None => {
                let connection = self.manager.connect(cfg).await?;
                let entry = Arc::new(SharedJump::new(connection));
                entries.insert(key.clone(), Arc::clone(&entry));
                tracing::info!(jump = %key, "Opened shared jump connection");
                entry
            }
        };
        let refs = entry.acquire();
        drop(entries);

        tracing::debug!(jump = %key, refs, "Jump connection acquired");
        Ok(Arc::clone(entry.connection.link()))
    }

    /// Give back one reference for `cfg`; the last one closes the connection.
    ///
    /// Releasing an unknown key does nothing.
    pub async fn release(&self, cfg: &ConnectionConfig) {
        let key = cfg.key();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(&key).map(Arc::clone) else {
            tracing::debug!(jump = %key, "Release of unknown jump connection ignored");
            return;
        };

        let refs = entry.release();
        tracing::debug!(jump = %key, refs, "Jump connection released");
        if refs == 0 {
            entries.remove(&key);
            drop(entries);
            entry.close().await;
            tracing::info!(jump = %key, "Closed shared jump connection");
        }
    }

    /// Current reference count for `cfg`, if pooled.
    pub async fn ref_count(&self, cfg: &ConnectionConfig) -> Option<usize> {
        let entries = self.entries.lock().await;
        entries.get(&cfg.key()).map(|entry| entry.refs())
    }

    /// Pool statistics.
    pub async fn stats(&self) -> PoolStats {
        let entries = self.entries.lock().await;
        PoolStats {
            hosts: entries.len(),
            references: entries.values().map(|entry| entry.refs()).sum(),
        }
    }

    /// Close every pooled connection regardless of outstanding references.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            entry.close().await;
        }
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of pooled jump connections.
    pub hosts: usize,
    /// Sum of outstanding references.
    pub references: usize,
}

impl PoolStats {
    /// Check if the pool is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hosts == 0
    }
}
