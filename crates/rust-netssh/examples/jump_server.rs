//! Jump-host example.
//!
//! Runs one command on a device reachable only through a bastion.
//!
//! Run with: `cargo run --example jump_server`
//!
//! Connection details come from the environment:
//! `JUMP_HOST`, `JUMP_USER`, `JUMP_KEY` (path to a private key),
//! `DEVICE_HOST`, `DEVICE_USER`, `DEVICE_PASSWORD`.
//! `NETSSH_PLATFORM`, `NETSSH_TIMEOUT_SECS` and friends tune the profile.

use rust_netssh::prelude::*;
use rust_netssh::{EnvConfig, LogConfig, init_logging};

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| NetsshError::config(format!("{name} is not set")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvConfig::default();
    init_logging(&LogConfig::from_env(&env))?;

    let bastion = ConnectionConfig::new(required("JUMP_HOST")?, required("JUMP_USER")?)
        .key_path(required("JUMP_KEY")?);
    let device = ConnectionConfig::new(required("DEVICE_HOST")?, required("DEVICE_USER")?)
        .password(required("DEVICE_PASSWORD")?)
        .via(bastion);

    let mut session = DeviceSession::new(PlatformProfile::from_env(&env)?);
    session.connect(&device).await?;

    let artifact = session.execute("show version", None).await?;
    println!("Output written to {} ({})", artifact.path.display(), artifact.completion);
    println!("{}", artifact.read_to_string().await?);

    session.disconnect().await;
    Ok(())
}
