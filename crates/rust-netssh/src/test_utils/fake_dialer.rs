//! Scripted dialer recording every attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::fake_link::FakeLink;
use super::scripts::{ExecScript, ShellScript};
use crate::backend::ssh::auth::AuthMaterial;
use crate::config::ConnectionConfig;
use crate::error::{NetsshError, Result};
use crate::transport::{Dialer, Link};

/// One recorded dial.
#[derive(Debug, Clone)]
pub struct DialAttempt {
    /// Host that was dialled.
    pub host: String,
    /// Label of the jump link, for relayed dials.
    pub via: Option<String>,
    /// When the attempt started.
    pub at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Times(u32),
    Always,
    Hang,
    RejectAuth,
}

#[derive(Debug, Default)]
struct State {
    failed: HashMap<String, u32>,
    attempts: Vec<DialAttempt>,
    links: Vec<(String, Arc<FakeLink>)>,
    cancels: Vec<CancellationToken>,
}

/// A [`Dialer`] producing [`FakeLink`]s, with per-host failure scripts.
#[derive(Debug, Default)]
pub struct FakeDialer {
    failures: HashMap<String, Failure>,
    dial_delay: Duration,
    shell: Option<ShellScript>,
    exec: Option<ExecScript>,
    state: Mutex<State>,
}

impl FakeDialer {
    /// A dialer where every host answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the first `times` dials to `host`.
    #[must_use]
    pub fn fail_times(mut self, host: &str, times: u32) -> Self {
        self.failures.insert(host.to_string(), Failure::Times(times));
        self
    }

    /// Refuse every dial to `host`.
    #[must_use]
    pub fn fail_always(mut self, host: &str) -> Self {
        self.failures.insert(host.to_string(), Failure::Always);
        self
    }

    /// Never finish dials to `host`.
    #[must_use]
    pub fn hang(mut self, host: &str) -> Self {
        self.failures.insert(host.to_string(), Failure::Hang);
        self
    }

    /// Reject authentication on `host`.
    #[must_use]
    pub fn reject_auth(mut self, host: &str) -> Self {
        self.failures.insert(host.to_string(), Failure::RejectAuth);
        self
    }

    /// Delay every dial by `delay`.
    #[must_use]
    pub const fn dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    /// Give every link this shell script.
    #[must_use]
    pub fn with_shell(mut self, script: ShellScript) -> Self {
        self.shell = Some(script);
        self
    }

    /// Give every link this exec script.
    #[must_use]
    pub fn with_exec(mut self, script: ExecScript) -> Self {
        self.exec = Some(script);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every dial so far, in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<DialAttempt> {
        self.state().attempts.clone()
    }

    /// The most recent link handed out for `host`.
    #[must_use]
    pub fn link(&self, host: &str) -> Option<Arc<FakeLink>> {
        self.state()
            .links
            .iter()
            .rev()
            .find(|(h, _)| h == host)
            .map(|(_, link)| Arc::clone(link))
    }

    /// Cancellation tokens passed to relayed dials.
    #[must_use]
    pub fn cancel_tokens(&self) -> Vec<CancellationToken> {
        self.state().cancels.clone()
    }

    fn record(&self, target: &ConnectionConfig, via: Option<String>) {
        self.state().attempts.push(DialAttempt {
            host: target.host.clone(),
            via,
            at: Instant::now(),
        });
    }

    async fn answer(
        &self,
        target: &ConnectionConfig,
        auth: &AuthMaterial,
        cancel: Option<CancellationToken>,
    ) -> Result<Arc<dyn Link>> {
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }

        let refused = || NetsshError::dial(target.key(), "connection refused");
        match self.failures.get(&target.host).copied() {
            Some(Failure::Always) => return Err(refused()),
            Some(Failure::RejectAuth) => {
                return Err(NetsshError::auth(&auth.username, "server rejected credentials"));
            }
            Some(Failure::Hang) => {
                match cancel {
                    Some(cancel) => cancel.cancelled().await,
                    None => futures::future::pending::<()>().await,
                }
                return Err(NetsshError::channel("dial abandoned"));
            }
            Some(Failure::Times(times)) => {
                let mut state = self.state();
                let failed = state.failed.entry(target.host.clone()).or_default();
                if *failed < times {
                    *failed += 1;
                    return Err(refused());
                }
            }
            None => {}
        }

        let mut link = FakeLink::new(target.key());
        if let Some(shell) = &self.shell {
            link = link.with_shell(shell.clone());
        }
        if let Some(exec) = &self.exec {
            link = link.with_exec(exec.clone());
        }
        let link = Arc::new(link);
        self.state().links.push((target.host.clone(), Arc::clone(&link)));
        Ok(link)
    }
}

impl Dialer for FakeDialer {
    fn dial<'a>(
        &'a self,
        target: &'a ConnectionConfig,
        auth: &'a AuthMaterial,
    ) -> BoxFuture<'a, Result<Arc<dyn Link>>> {
        Box::pin(async move {
            self.record(target, None);
            self.answer(target, auth, None).await
        })
    }

    fn dial_via<'a>(
        &'a self,
        jump: Arc<dyn Link>,
        target: &'a ConnectionConfig,
        auth: &'a AuthMaterial,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<Arc<dyn Link>>> {
        Box::pin(async move {
            self.record(target, Some(jump.label().to_string()));
            self.state().cancels.push(cancel.clone());
            jump.open_tunnel(&target.host, target.port).await?;
            self.answer(target, auth, Some(cancel)).await
        })
    }
}
