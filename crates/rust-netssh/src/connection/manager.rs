//! Direct and jump-relayed connection establishment.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::retry::{DEFAULT_RETRY_DELAY, RetryPolicy, RetryState};
use crate::backend::ssh::RusshDialer;
use crate::backend::ssh::auth::{self, AuthMaterial};
use crate::config::ConnectionConfig;
use crate::error::{NetsshError, Result};
use crate::transport::{Dialer, Link};

/// An established connection to a target, plus the hops it owns.
pub struct Connection {
    link: Arc<dyn Link>,
    upstream: Vec<Arc<dyn Link>>,
    target: String,
    closed: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("hops", &self.hops())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    fn new(link: Arc<dyn Link>, upstream: Vec<Arc<dyn Link>>, target: String) -> Self {
        Self {
            link,
            upstream,
            target,
            closed: AtomicBool::new(false),
        }
    }

    /// The link to the target.
    #[must_use]
    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }

    /// `user@host:port` of the target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of links this connection owns, the target included.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.upstream.len() + 1
    }

    /// Whether [`Connection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the target, then each owned hop from the innermost outwards.
    /// Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.link.close().await;
        for hop in self.upstream.iter().rev() {
            hop.close().await;
        }
        tracing::debug!(endpoint = %self.target, "Connection closed");
    }
}

/// Dials targets directly or through their jump chain.
#[derive(Clone)]
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    retry_delay: Duration,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dialer", &self.dialer)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Arc::new(RusshDialer::default()))
    }
}

impl ConnectionManager {
    /// Create a manager dialing through `dialer`.
    #[must_use]
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the pause between direct dial attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Connect to `cfg`, walking its jump chain from the outermost hop.
    ///
    /// Credentials for every hop are resolved before anything is dialled.
    /// The first hop is dialled directly with retry; later hops are relayed
    /// once each. For chains, failures are reported as
    /// [`NetsshError::Hop`] and the hops already opened are closed.
    pub async fn connect(&self, cfg: &ConnectionConfig) -> Result<Connection> {
        let hops = cfg.chain();
        let material = auth::resolve_chain(cfg).await?;
        let depth = hops.len();

        tracing::info!(endpoint = %cfg.key(), hops = depth, "Connecting");

        let mut opened: Vec<Arc<dyn Link>> = Vec::with_capacity(depth);
        for (index, (hop, auth)) in hops.iter().zip(&material).enumerate() {
            let result = match opened.last() {
                None => self.dial_direct(hop, auth).await,
                Some(jump) => self.dial_relayed(Arc::clone(jump), hop, auth).await,
            };

            match result {
                Ok(link) => opened.push(link),
                Err(err) => {
                    for link in opened.iter().rev() {
                        link.close().await;
                    }
                    tracing::error!(endpoint = %hop.key(), hop = index + 1, error = %err, "Connection failed");
                    return Err(if depth > 1 {
                        NetsshError::hop(index + 1, hop.key(), err)
                    } else {
                        err
                    });
                }
            }
        }

        let Some(link) = opened.pop() else {
            return Err(NetsshError::config("connection chain is empty"));
        };
        Ok(Connection::new(link, opened, cfg.key()))
    }

    /// Connect to `cfg` through an already established `jump` link.
    ///
    /// The returned connection does not own `jump`; closing it leaves the
    /// jump link open.
    pub async fn connect_via(&self, jump: Arc<dyn Link>, cfg: &ConnectionConfig) -> Result<Connection> {
        let auth = auth::resolve(cfg).await?;
        self.connect_via_resolved(jump, cfg, &auth).await
    }

    /// [`Self::connect_via`] with the target's credentials already resolved.
    pub(crate) async fn connect_via_resolved(
        &self,
        jump: Arc<dyn Link>,
        cfg: &ConnectionConfig,
        auth: &AuthMaterial,
    ) -> Result<Connection> {
        tracing::info!(endpoint = %cfg.key(), via = %jump.label(), "Connecting through shared jump host");

        let link = self
            .dial_relayed(jump, cfg, auth)
            .await
            .map_err(|err| NetsshError::hop(cfg.depth(), cfg.key(), err))?;
        Ok(Connection::new(link, Vec::new(), cfg.key()))
    }

    async fn dial_direct(&self, cfg: &ConnectionConfig, auth: &AuthMaterial) -> Result<Arc<dyn Link>> {
        let endpoint = cfg.key();
        let mut state = RetryState::new(RetryPolicy::fixed(self.retry_delay, cfg.effective_max_retry()));
        let mut last_error = None;

        while let Some(delay) = state.next_delay() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            state.record_attempt();

            let outcome = tokio::time::timeout(cfg.connect_timeout, self.dialer.dial(cfg, auth)).await;
            let err = match outcome {
                Ok(Ok(link)) => {
                    tracing::debug!(endpoint = %endpoint, attempt = state.attempt(), "Dial succeeded");
                    return Ok(link);
                }
                Ok(Err(err)) if !RetryPolicy::is_retryable(&err) => return Err(err),
                Ok(Err(err)) => err,
                Err(_) => NetsshError::DialTimeout {
                    target: endpoint.clone(),
                    waited: cfg.connect_timeout,
                },
            };
            tracing::warn!(
                endpoint = %endpoint,
                attempt = state.attempt(),
                max_attempts = cfg.effective_max_retry(),
                error = %err,
                "Dial attempt failed"
            );
            last_error = Some(err);
        }

        let last = last_error.unwrap_or_else(|| NetsshError::dial(&endpoint, "no attempt was made"));
        Err(NetsshError::Connect {
            target: endpoint,
            attempts: state.attempt(),
            source: Box::new(last),
        })
    }

    async fn dial_relayed(
        &self,
        jump: Arc<dyn Link>,
        cfg: &ConnectionConfig,
        auth: &AuthMaterial,
    ) -> Result<Arc<dyn Link>> {
        let cancel = CancellationToken::new();
        let attempt = self.dialer.dial_via(jump, cfg, auth, cancel.clone());

        match tokio::time::timeout(cfg.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(endpoint = %cfg.key(), waited = ?cfg.connect_timeout, "Relayed dial timed out");
                Err(NetsshError::DialTimeout {
                    target: cfg.key(),
                    waited: cfg.connect_timeout,
                })
            }
        }
    }
}
