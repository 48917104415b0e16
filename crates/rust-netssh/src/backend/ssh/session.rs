//! `russh` dialer and link.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use russh::client;
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey};
use tokio_util::sync::CancellationToken;

use super::auth::{AuthMaterial, AuthMethod};
use super::channel::spawn_channel_pump;
use crate::config::ConnectionConfig;
use crate::error::{NetsshError, Result};
use crate::transport::{BoxedTunnel, ChannelIo, Dialer, Link, PtyRequest};

/// Client handler that accepts every server key.
#[derive(Debug)]
pub struct ClientHandler {
    /// The `user@host:port` being connected to.
    pub target: String,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        tracing::debug!(
            target_host = %self.target,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting server key without verification"
        );
        Ok(true)
    }
}

/// Authenticate `handle` with `auth`.
async fn authenticate(handle: &mut client::Handle<ClientHandler>, auth: &AuthMaterial) -> Result<()> {
    let username = &auth.username;
    let result = match &auth.method {
        AuthMethod::Password(password) => {
            tracing::debug!(user = %username, "Attempting password authentication");
            handle.authenticate_password(username, password).await
        }
        AuthMethod::PublicKey(key) => {
            tracing::debug!(user = %username, "Attempting public key authentication");
            let rsa_hash = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::clone(key), rsa_hash);
            handle.authenticate_publickey(username, key_with_hash).await
        }
    };

    match result {
        Ok(outcome) if outcome.success() => {
            tracing::debug!(user = %username, "Authentication successful");
            Ok(())
        }
        Ok(_) => Err(NetsshError::auth(username, "rejected by server")),
        Err(e) => Err(NetsshError::auth(username, e.to_string())),
    }
}

/// Dials real SSH servers with `russh`.
#[derive(Clone)]
pub struct RusshDialer {
    config: Arc<client::Config>,
}

impl fmt::Debug for RusshDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshDialer").finish_non_exhaustive()
    }
}

impl Default for RusshDialer {
    fn default() -> Self {
        Self::new(client::Config::default())
    }
}

impl RusshDialer {
    /// Create a dialer using `config` for every connection.
    #[must_use]
    pub fn new(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Dialer for RusshDialer {
    fn dial<'a>(
        &'a self,
        target: &'a ConnectionConfig,
        auth: &'a AuthMaterial,
    ) -> BoxFuture<'a, Result<Arc<dyn Link>>> {
        Box::pin(async move {
            let label = target.key();
            let handler = ClientHandler {
                target: label.clone(),
            };
            let mut handle = client::connect(
                Arc::clone(&self.config),
                (target.host.as_str(), target.port),
                handler,
            )
            .await
            .map_err(|e| NetsshError::dial(&label, e.to_string()))?;

            authenticate(&mut handle, auth).await?;
            let link: Arc<dyn Link> = Arc::new(RusshLink::new(handle, label));
            Ok(link)
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
            let label = target.key();
            let attempt = async {
                let tunnel = jump.open_tunnel(&target.host, target.port).await?;
                let handler = ClientHandler {
                    target: label.clone(),
                };
                let mut handle = client::connect_stream(Arc::clone(&self.config), tunnel, handler)
                    .await
                    .map_err(|e| NetsshError::dial(&label, e.to_string()))?;
                authenticate(&mut handle, auth).await?;
                let link: Arc<dyn Link> = Arc::new(RusshLink::new(handle, label.clone()));
                Ok(link)
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    Err(NetsshError::dial(&label, format!("cancelled while relaying through {}", jump.label())))
                }
                result = attempt => result,
            }
        })
    }
}

/// An authenticated `russh` connection.
pub struct RusshLink {
    handle: client::Handle<ClientHandler>,
    label: String,
}

impl fmt::Debug for RusshLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusshLink")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl RusshLink {
    fn new(handle: client::Handle<ClientHandler>, label: String) -> Self {
        tracing::info!(link = %label, "SSH connection established");
        Self { handle, label }
    }

    async fn open_session(&self) -> Result<russh::Channel<client::Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| NetsshError::channel(format!("session open failed on {}: {e}", self.label)))
    }
}

impl Link for RusshLink {
    fn label(&self) -> &str {
        &self.label
    }

    fn open_shell<'a>(&'a self, pty: &'a PtyRequest) -> BoxFuture<'a, Result<ChannelIo>> {
        Box::pin(async move {
            let channel = self.open_session().await?;
            let modes = [
                (russh::Pty::ECHO, u32::from(pty.echo)),
                (russh::Pty::TTY_OP_ISPEED, pty.speed),
                (russh::Pty::TTY_OP_OSPEED, pty.speed),
            ];
            channel
                .request_pty(false, &pty.term, pty.cols, pty.rows, 0, 0, &modes)
                .await
                .map_err(|e| NetsshError::channel(format!("PTY request failed: {e}")))?;
            channel
                .request_shell(false)
                .await
                .map_err(|e| NetsshError::channel(format!("shell request failed: {e}")))?;
            Ok(spawn_channel_pump(channel, self.label.clone()))
        })
    }

    fn open_exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ChannelIo>> {
        Box::pin(async move {
            let channel = self.open_session().await?;
            channel
                .exec(false, command)
                .await
                .map_err(|e| NetsshError::channel(format!("exec request failed: {e}")))?;
            Ok(spawn_channel_pump(channel, self.label.clone()))
        })
    }

    fn open_tunnel<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, Result<BoxedTunnel>> {
        Box::pin(async move {
            let channel = self
                .handle
                .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
                .await
                .map_err(|e| {
                    NetsshError::channel(format!(
                        "direct-tcpip to {host}:{port} via {} failed: {e}",
                        self.label
                    ))
                })?;
            let tunnel: BoxedTunnel = Box::new(channel.into_stream());
            Ok(tunnel)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self
                .handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                tracing::debug!(link = %self.label, error = %e, "Disconnect failed");
            }
            tracing::info!(link = %self.label, "SSH connection closed");
        })
    }
}
