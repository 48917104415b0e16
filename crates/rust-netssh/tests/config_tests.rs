//! Integration tests for configuration, profiles and errors.

use std::time::Duration;

use rust_netssh::config::{DEFAULT_FIRST_BYTE_TIMEOUT, DEFAULT_TIMEOUT};
use rust_netssh::{
    ConnectionConfig, EnvConfig, ErrorKind, ExecuteOptions, NetsshError, Platform,
    PlatformProfile, ProfileFile, SentinelStyle,
};

#[test]
fn connection_config_defaults() {
    let cfg = ConnectionConfig::new("10.0.0.1", "admin").password("secret");
    assert_eq!(cfg.port, 22);
    assert_eq!(cfg.max_retry, 3);
    assert_eq!(cfg.key(), "admin@10.0.0.1:22");
    assert!(cfg.jump.is_none());
}

#[test]
fn debug_output_hides_password() {
    let cfg = ConnectionConfig::new("10.0.0.1", "admin").password("hunter2");
    let debug = format!("{cfg:?}");
    assert!(!debug.contains("hunter2"));
}

#[test]
fn chain_is_outermost_first() {
    let cfg = ConnectionConfig::new("core1", "admin").via(
        ConnectionConfig::new("inner", "ops").via(ConnectionConfig::new("bastion", "ops").port(2222)),
    );
    let hosts: Vec<_> = cfg.chain().iter().map(|hop| hop.address()).collect();
    assert_eq!(hosts, ["bastion:2222", "inner:22", "core1:22"]);
    assert_eq!(cfg.depth(), 3);
}

#[test]
fn execute_options_defaults() {
    let options = ExecuteOptions::default();
    assert_eq!(options.timeout, DEFAULT_TIMEOUT);
    assert_eq!(options.first_byte_timeout, DEFAULT_FIRST_BYTE_TIMEOUT);
}

#[test]
fn platform_table() {
    let xr = PlatformProfile::for_platform(Platform::CiscoIosXr);
    assert_eq!(xr.sentinel, SentinelStyle::Comment);
    assert_eq!(xr.execute.first_byte_timeout, Duration::from_secs(300));

    let linux = PlatformProfile::for_platform(Platform::Linux);
    assert_eq!(linux.sentinel, SentinelStyle::Echo);
    assert_eq!(linux.execute.first_byte_timeout, Duration::from_secs(300));
    assert_eq!(linux.execute.timeout, Duration::from_secs(10));
    assert_eq!(linux.output_dir.to_str(), Some("ssh_command_outputs"));
}

#[test]
fn environment_overrides_profile() {
    let env = EnvConfig::default()
        .with_override("PLATFORM", "nx-os")
        .with_override("TIMEOUT_SECS", "30")
        .with_override("SETTLE_MS", "250");
    let profile = PlatformProfile::from_env(&env).expect("profile");

    assert_eq!(profile.platform, Platform::CiscoNxos);
    assert_eq!(profile.execute.timeout, Duration::from_secs(30));
    assert_eq!(profile.settle_delay, Duration::from_millis(250));
}

#[test]
fn profile_file_round_trip_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("device.toml");
    std::fs::write(
        &path,
        "platform = \"iosxe\"\n\n[execute]\ntimeout_secs = 5\n\n[session]\noutput_dir = \"captures\"\n",
    )
    .expect("write");

    let profile = ProfileFile::load(&path).expect("load");
    assert_eq!(profile.platform, Platform::CiscoIosXe);
    assert_eq!(profile.execute.timeout, Duration::from_secs(5));
    assert_eq!(profile.output_dir.to_str(), Some("captures"));
}

#[test]
fn bad_profile_file_is_config_error() {
    let err = ProfileFile::parse("platform = \"vms\"").and_then(ProfileFile::into_profile).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn wrapped_errors_report_inner_kind() {
    let err = NetsshError::hop(
        2,
        "admin@core1:22",
        NetsshError::auth("admin", "permission denied"),
    );
    assert!(err.is_auth());
    assert_eq!(err.hop_index(), Some(2));
    assert!(err.to_string().contains("hop 2"));
}
