//! SCP download example.
//!
//! Run with: `cargo run --example download -- <host> <user> <key-path> <remote-path> <local-path>`

use rust_netssh::prelude::*;
use rust_netssh::{LogConfig, LogFormat, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogConfig::new().format(LogFormat::Json))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, user, key, remote, local] = args.as_slice() else {
        eprintln!("usage: download <host> <user> <key-path> <remote-path> <local-path>");
        return Ok(());
    };

    let mut session = DeviceSession::new(PlatformProfile::for_platform(Platform::Linux));
    session.connect(&ConnectionConfig::new(host, user).key_path(key)).await?;

    let summary = session.download(remote, local).await?;
    println!(
        "{} ({} bytes, mode {:04o}) -> {}",
        summary.name,
        summary.size,
        summary.mode,
        summary.local_path.display()
    );

    session.disconnect().await;
    Ok(())
}
