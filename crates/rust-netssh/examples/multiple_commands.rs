//! Batched commands example.
//!
//! Runs several commands in one shell and prints where each output landed.
//!
//! Run with: `cargo run --example multiple_commands -- <host> <user> <password>`

use rust_netssh::prelude::*;
use rust_netssh::{LogConfig, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogConfig::new().filter("rust_netssh=info"))?;

    let mut args = std::env::args().skip(1);
    let (Some(host), Some(user), Some(password)) = (args.next(), args.next(), args.next()) else {
        eprintln!("usage: multiple_commands <host> <user> <password>");
        return Ok(());
    };

    let profile = PlatformProfile::for_platform(Platform::CiscoIosXr).output_dir("captures");
    let mut session = DeviceSession::new(profile);
    session
        .connect(&ConnectionConfig::new(host, user).password(password).max_retry(5))
        .await?;

    let commands = ["show clock", "show platform", "show ip interface brief"];
    match session.execute_multiple(&commands, None).await {
        Ok(artifacts) => {
            for artifact in &artifacts {
                let note = if artifact.completion.is_complete() { "" } else { " (may be truncated)" };
                println!("{} -> {}{note}", commands[artifact.index.unwrap_or_default()], artifact.path.display());
            }
        }
        Err(err) => {
            eprintln!("batch stopped: {err}");
            for artifact in err.completed_artifacts() {
                println!("kept {}", artifact.path.display());
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
