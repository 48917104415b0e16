//! Authentication material.
//!
//! Material for every hop is resolved before the first packet is sent, so a
//! missing key file fails fast instead of after a half-built jump chain.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use russh::keys::PrivateKey;

use crate::config::ConnectionConfig;
use crate::error::{NetsshError, Result};

/// How to prove identity to one server.
#[derive(Clone)]
pub enum AuthMethod {
    /// A decoded private key.
    PublicKey(Arc<PrivateKey>),
    /// A password.
    Password(String),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().as_str())
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
        }
    }
}

/// Resolved credentials for one hop.
#[derive(Debug, Clone)]
pub struct AuthMaterial {
    /// Login user.
    pub username: String,
    /// Proof of identity.
    pub method: AuthMethod,
}

impl AuthMaterial {
    /// Password material.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            method: AuthMethod::Password(password.into()),
        }
    }

    /// Whether this is key material.
    #[must_use]
    pub const fn is_public_key(&self) -> bool {
        matches!(self.method, AuthMethod::PublicKey(_))
    }
}

/// Resolve the credentials of `cfg`.
///
/// A key path wins over a password. A config with neither, or without a
/// host or user, is rejected before any I/O.
pub async fn resolve(cfg: &ConnectionConfig) -> Result<AuthMaterial> {
    if cfg.host.trim().is_empty() {
        return Err(NetsshError::config("host must not be empty"));
    }
    if cfg.username.trim().is_empty() {
        return Err(NetsshError::config(format!(
            "username must not be empty for {}",
            cfg.address()
        )));
    }

    if let Some(path) = &cfg.key_path {
        let key = load_private_key(path, &cfg.username, cfg.key_passphrase.as_deref()).await?;
        return Ok(AuthMaterial {
            username: cfg.username.clone(),
            method: AuthMethod::PublicKey(key),
        });
    }

    match &cfg.password {
        Some(password) => Ok(AuthMaterial::password(&cfg.username, password)),
        None => Err(NetsshError::config(format!(
            "no key path or password configured for {}",
            cfg.key()
        ))),
    }
}

/// Resolve every hop of `cfg`'s chain, outermost first.
pub async fn resolve_chain(cfg: &ConnectionConfig) -> Result<Vec<AuthMaterial>> {
    let mut material = Vec::with_capacity(cfg.depth());
    for hop in cfg.chain() {
        material.push(resolve(hop).await?);
    }
    Ok(material)
}

/// Read and decode a private key file.
pub async fn load_private_key(
    path: &Path,
    user: &str,
    passphrase: Option<&str>,
) -> Result<Arc<PrivateKey>> {
    let key_str = tokio::fs::read_to_string(path).await.map_err(|e| {
        NetsshError::auth(user, format!("failed to read key file {}: {e}", path.display()))
    })?;

    let key = russh::keys::decode_secret_key(&key_str, passphrase).map_err(|e| {
        NetsshError::auth(user, format!("failed to decode key {}: {e}", path.display()))
    })?;

    Ok(Arc::new(key))
}
