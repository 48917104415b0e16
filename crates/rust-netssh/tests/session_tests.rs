//! End-to-end session tests against scripted links.
//!
//! These tests require the `test-utils` feature to be enabled.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use rust_netssh::{
    Completion, ConnectionConfig, ConnectionManager, DeviceSession, Dialer, ExecScript,
    ExecuteOptions, FakeDialer, JumpPool, Platform, PlatformProfile, ShellReply, ShellScript,
};

fn profile(platform: Platform, dir: &std::path::Path) -> PlatformProfile {
    PlatformProfile::for_platform(platform)
        .output_dir(dir)
        .settle_delay(Duration::from_millis(20))
        .shutdown_grace(Duration::from_millis(200))
        .execute(
            ExecuteOptions::new()
                .timeout(Duration::from_millis(300))
                .first_byte_timeout(Duration::from_secs(2)),
        )
}

fn router_shell() -> ShellScript {
    ShellScript::new(|cmd| match cmd {
        "show clock" => ShellReply::lines(["*12:00:00.000 UTC Mon Jan 1 2024"]),
        "show ip interface brief" => ShellReply::lines([
            "Interface  IP-Address  OK? Method Status Protocol",
            "Gi0/0      10.0.0.1    YES manual up     up",
        ]),
        _ => ShellReply::lines(["% Invalid input detected at '^' marker."]),
    })
    .banner(["User Access Verification"])
    .prompt("RP/0/RSP0/CPU0:core1#")
}

fn target() -> ConnectionConfig {
    ConnectionConfig::new("core1", "admin")
        .password("pw")
        .via(ConnectionConfig::new("bastion", "ops").password("pw"))
}

#[tokio::test]
async fn batch_through_jump_host() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dialer = Arc::new(FakeDialer::new().with_shell(router_shell()));
    let manager = ConnectionManager::new(Arc::clone(&dialer) as Arc<dyn Dialer>);

    let mut session = DeviceSession::with_manager(profile(Platform::CiscoIosXr, dir.path()), manager);
    session.connect(&target()).await.expect("connect");

    let artifacts = session
        .execute_multiple(&["show clock", "show ip interface brief"], None)
        .await
        .expect("batch");
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts.iter().all(|a| a.completion == Completion::Sentinel));

    let interfaces = artifacts[1].read_to_string().await.expect("read");
    assert!(interfaces.contains("Gi0/0"));
    assert!(!interfaces.contains("*12:00"));
    assert!(!interfaces.contains("__NETSSH_"));

    session.disconnect().await;
    assert_eq!(dialer.link("core1").expect("core1").close_count(), 1);
    assert_eq!(dialer.link("bastion").expect("bastion").close_count(), 1);
}

#[tokio::test]
async fn single_command_and_download_share_a_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dialer = Arc::new(
        FakeDialer::new()
            .with_shell(router_shell())
            .with_exec(ExecScript::scp_source("running-config", 0o600, "hostname core1\n")),
    );
    let manager = ConnectionManager::new(Arc::clone(&dialer) as Arc<dyn Dialer>);
    let mut session = DeviceSession::with_manager(profile(Platform::CiscoIosXr, dir.path()), manager);
    session.connect(&target()).await.expect("connect");

    let artifact = session.execute("show clock", None).await.expect("execute");
    assert_eq!(artifact.completion, Completion::Idle);
    assert!(artifact.read_to_string().await.expect("read").contains("UTC"));

    let local = dir.path().join("core1.cfg");
    let summary = session.download("running-config", &local).await.expect("download");
    assert_eq!(summary.size, 15);
    assert_eq!(std::fs::read_to_string(&local).expect("read"), "hostname core1\n");

    // One dial per hop for the whole session.
    assert_eq!(dialer.attempts().len(), 2);
    session.disconnect().await;
}

#[tokio::test]
async fn sessions_share_pooled_jump() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dialer = Arc::new(FakeDialer::new().with_shell(router_shell()));
    let manager = ConnectionManager::new(Arc::clone(&dialer) as Arc<dyn Dialer>);
    let pool = Arc::new(JumpPool::new(manager.clone()));

    let mut sessions = Vec::new();
    for host in ["core1", "core2", "core3"] {
        let mut session = DeviceSession::with_manager(profile(Platform::CiscoIosXr, dir.path()), manager.clone())
            .with_jump_pool(Arc::clone(&pool));
        session
            .connect(
                &ConnectionConfig::new(host, "admin")
                    .password("pw")
                    .via(ConnectionConfig::new("bastion", "ops").password("pw")),
            )
            .await
            .expect("connect");
        sessions.push(session);
    }

    let stats = pool.stats().await;
    assert_eq!((stats.hosts, stats.references), (1, 3));
    assert_eq!(dialer.link("bastion").expect("bastion").tunnel_count(), 3);

    for session in &mut sessions {
        session.disconnect().await;
    }
    assert!(pool.stats().await.is_empty());
    assert_eq!(dialer.link("bastion").expect("bastion").close_count(), 1);
}
