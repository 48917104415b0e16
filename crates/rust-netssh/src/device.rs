//! The per-device session façade.
//!
//! [`DeviceSession`] ties a [`PlatformProfile`] to one connection and
//! exposes the operations a caller needs: connect, run commands, download a
//! file, disconnect.
//!
//! # Example
//!
//! ```ignore
//! use rust_netssh::{ConnectionConfig, DeviceSession, Platform, PlatformProfile};
//!
//! let mut session = DeviceSession::new(PlatformProfile::for_platform(Platform::CiscoIosXr));
//! session
//!     .connect(&ConnectionConfig::new("10.0.0.1", "admin").password("secret"))
//!     .await?;
//! let artifact = session.execute("show version", None).await?;
//! println!("{}", artifact.read_to_string().await?);
//! session.disconnect().await;
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::backend::ssh::auth;
use crate::config::{ConnectionConfig, ExecuteOptions};
use crate::connection::{Connection, ConnectionManager, JumpPool};
use crate::error::{NetsshError, Result};
use crate::exec::{InteractiveExecutor, MultiCommandExecutor};
use crate::output::OutputArtifact;
use crate::profile::PlatformProfile;
use crate::transfer::{FileTransferClient, TransferSummary};
use crate::transport::Link;

#[derive(Debug)]
struct ActiveConnection {
    connection: Connection,
    /// Jump config leased from the pool, released on disconnect.
    pooled_jump: Option<ConnectionConfig>,
}

/// A connection to one device, driven by a platform profile.
#[derive(Debug)]
pub struct DeviceSession {
    profile: PlatformProfile,
    manager: ConnectionManager,
    pool: Option<Arc<JumpPool>>,
    active: Option<ActiveConnection>,
}

impl DeviceSession {
    /// Session dialling over SSH with `profile`.
    #[must_use]
    pub fn new(profile: PlatformProfile) -> Self {
        Self::with_manager(profile, ConnectionManager::default())
    }

    /// Session dialling through `manager`.
    #[must_use]
    pub const fn with_manager(profile: PlatformProfile, manager: ConnectionManager) -> Self {
        Self {
            profile,
            manager,
            pool: None,
            active: None,
        }
    }

    /// Lease the first jump hop from `pool` instead of dialling it.
    #[must_use]
    pub fn with_jump_pool(mut self, pool: Arc<JumpPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The session's profile.
    #[must_use]
    pub const fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    /// Whether a connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// `user@host:port` of the connected target.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.connection.target())
    }

    /// Connect to `cfg`, replacing any open connection.
    ///
    /// With a jump pool and a jump parent on `cfg`, the parent (and its own
    /// chain) comes from the pool and only the target is dialled here.
    /// Credentials for the whole chain are checked before the pool is asked.
    pub async fn connect(&mut self, cfg: &ConnectionConfig) -> Result<()> {
        if self.active.is_some() {
            tracing::debug!(endpoint = %cfg.key(), "Replacing existing connection");
            self.disconnect().await;
        }

        let active = match (&self.pool, cfg.jump.as_deref()) {
            (Some(pool), Some(jump)) => {
                let mut material = auth::resolve_chain(cfg).await?;
                let Some(target_auth) = material.pop() else {
                    return Err(NetsshError::config("connection chain is empty"));
                };
                let link = pool.get(jump).await.map_err(|err| {
                    if err.hop_index().is_some() {
                        err
                    } else {
                        NetsshError::hop(jump.depth(), jump.key(), err)
                    }
                })?;
                match self.manager.connect_via_resolved(link, cfg, &target_auth).await {
                    Ok(connection) => ActiveConnection {
                        connection,
                        pooled_jump: Some(jump.clone()),
                    },
                    Err(err) => {
                        pool.release(jump).await;
                        return Err(err);
                    }
                }
            }
            _ => ActiveConnection {
                connection: self.manager.connect(cfg).await?,
                pooled_jump: None,
            },
        };

        tracing::info!(endpoint = %active.connection.target(), platform = %self.profile.platform, "Session connected");
        self.active = Some(active);
        Ok(())
    }

    fn link(&self) -> Result<&dyn Link> {
        self.active
            .as_ref()
            .map(|active| active.connection.link().as_ref())
            .ok_or(NetsshError::NotConnected)
    }

    /// Run one command. `None` uses the profile's timers.
    pub async fn execute(&self, command: &str, options: Option<ExecuteOptions>) -> Result<OutputArtifact> {
        let link = self.link()?;
        InteractiveExecutor::new(&self.profile)
            .execute(link, command, options.unwrap_or(self.profile.execute))
            .await
    }

    /// Run `commands` in one shell. `None` uses the profile's timers.
    pub async fn execute_multiple<S: AsRef<str>>(
        &self,
        commands: &[S],
        options: Option<ExecuteOptions>,
    ) -> Result<Vec<OutputArtifact>> {
        let link = self.link()?;
        MultiCommandExecutor::new(&self.profile)
            .execute(link, commands, options.unwrap_or(self.profile.execute))
            .await
    }

    /// Download `remote` to `local` over SCP.
    pub async fn download(&self, remote: &str, local: impl AsRef<Path>) -> Result<TransferSummary> {
        let link = self.link()?;
        FileTransferClient::new(&self.profile)
            .download(link, remote, local.as_ref())
            .await
    }

    /// Close the connection and give back any pooled jump lease. Calling it
    /// again does nothing.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.connection.close().await;
        if let (Some(pool), Some(jump)) = (&self.pool, &active.pooled_jump) {
            pool.release(jump).await;
        }
        tracing::info!(endpoint = %active.connection.target(), "Session disconnected");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{FakeDialer, ShellReply, ShellScript};
    use crate::transport::Dialer;

    fn profile(dir: &Path) -> PlatformProfile {
        PlatformProfile::default()
            .output_dir(dir)
            .settle_delay(Duration::from_millis(20))
            .shutdown_grace(Duration::from_millis(200))
            .execute(
                ExecuteOptions::new()
                    .timeout(Duration::from_millis(200))
                    .first_byte_timeout(Duration::from_secs(2)),
            )
    }

    fn manager(dialer: &Arc<FakeDialer>) -> ConnectionManager {
        ConnectionManager::new(Arc::clone(dialer) as Arc<dyn Dialer>).retry_delay(Duration::from_millis(1))
    }

    fn bastion() -> ConnectionConfig {
        ConnectionConfig::new("bastion", "ops").password("pw")
    }

    #[tokio::test]
    async fn operations_need_a_connection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = DeviceSession::with_manager(profile(dir.path()), manager(&Arc::new(FakeDialer::new())));

        let err = session.execute("show clock", None).await.unwrap_err();
        assert!(matches!(err, NetsshError::NotConnected));
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(session.execute_multiple(&["a"], None).await.is_err());
        assert!(session.download("/x", dir.path().join("x")).await.is_err());
    }

    #[tokio::test]
    async fn execute_uses_profile_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialer = Arc::new(
            FakeDialer::new().with_shell(ShellScript::new(|_| ShellReply::lines(["12:00"]))),
        );
        let mut session = DeviceSession::with_manager(profile(dir.path()), manager(&dialer));

        session
            .connect(&ConnectionConfig::new("r1", "admin").password("pw"))
            .await
            .expect("connect");
        assert_eq!(session.target(), Some("admin@r1:22"));

        let artifact = session.execute("show clock", None).await.expect("execute");
        assert!(artifact.read_to_string().await.expect("read").contains("12:00"));

        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
        assert_eq!(dialer.link("r1").expect("link").close_count(), 1);
    }

    #[tokio::test]
    async fn pooled_jump_is_shared_and_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialer = Arc::new(FakeDialer::new());
        let pool = Arc::new(JumpPool::new(manager(&dialer)));

        let mut first = DeviceSession::with_manager(profile(dir.path()), manager(&dialer))
            .with_jump_pool(Arc::clone(&pool));
        let mut second = DeviceSession::with_manager(profile(dir.path()), manager(&dialer))
            .with_jump_pool(Arc::clone(&pool));

        first
            .connect(&ConnectionConfig::new("r1", "admin").password("pw").via(bastion()))
            .await
            .expect("first");
        second
            .connect(&ConnectionConfig::new("r2", "admin").password("pw").via(bastion()))
            .await
            .expect("second");

        let bastion_dials = dialer.attempts().iter().filter(|a| a.host == "bastion").count();
        assert_eq!(bastion_dials, 1);
        assert_eq!(pool.ref_count(&bastion()).await, Some(2));

        first.disconnect().await;
        let jump = dialer.link("bastion").expect("bastion");
        assert_eq!(jump.close_count(), 0);
        second.disconnect().await;
        assert_eq!(jump.close_count(), 1);
        assert!(pool.stats().await.is_empty());
    }

    #[tokio::test]
    async fn failed_target_gives_back_the_lease() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialer = Arc::new(FakeDialer::new().fail_always("r1"));
        let pool = Arc::new(JumpPool::new(manager(&dialer)));
        let mut session = DeviceSession::with_manager(profile(dir.path()), manager(&dialer))
            .with_jump_pool(Arc::clone(&pool));

        let err = session
            .connect(&ConnectionConfig::new("r1", "admin").password("pw").via(bastion()))
            .await
            .unwrap_err();
        assert_eq!(err.hop_index(), Some(2));
        assert!(!session.is_connected());
        assert!(pool.stats().await.is_empty());
        assert_eq!(dialer.link("bastion").expect("bastion").close_count(), 1);
    }

    #[tokio::test]
    async fn missing_target_credentials_dial_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialer = Arc::new(FakeDialer::new());
        let pool = Arc::new(JumpPool::new(manager(&dialer)));
        let mut session = DeviceSession::with_manager(profile(dir.path()), manager(&dialer))
            .with_jump_pool(Arc::clone(&pool));

        let err = session
            .connect(&ConnectionConfig::new("r1", "admin").via(bastion()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(dialer.attempts().is_empty());
        assert!(pool.stats().await.is_empty());
    }

    #[tokio::test]
    async fn failed_pooled_jump_names_the_hop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dialer = Arc::new(FakeDialer::new().fail_always("bastion"));
        let pool = Arc::new(JumpPool::new(manager(&dialer)));
        let mut session = DeviceSession::with_manager(profile(dir.path()), manager(&dialer))
            .with_jump_pool(Arc::clone(&pool));

        let err = session
            .connect(&ConnectionConfig::new("r1", "admin").password("pw").via(bastion()))
            .await
            .unwrap_err();
        assert_eq!(err.hop_index(), Some(1));
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(dialer.attempts().iter().all(|a| a.host == "bastion"));
        assert!(pool.stats().await.is_empty());
    }
}
