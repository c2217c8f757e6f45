use std::time::Duration;

use agent_control::config::DefaultBehavior;
use agent_control::{AppError, ClientSettings, ControlConfig};

fn sample_toml(workspace: &str) -> String {
    format!(
        r#"
host_cli = "claude"
host_cli_args = ["--output-format", "stream-json", "--input-format", "stream-json"]
workspace_root = '{workspace}'

[timeouts]
request_seconds = 30

[limits]
max_line_bytes = 4096
channel_capacity = 8
max_concurrent_dispatches = 4

[permissions]
default = "allow"
allowed_tools = ["Read", "Grep"]
denied_tools = ["Bash"]
"#
    )
}

#[test]
fn parses_full_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ControlConfig::from_toml_str(&sample_toml(&dir.path().to_string_lossy()))
        .expect("config parses");

    assert_eq!(config.host_cli, "claude");
    assert_eq!(config.host_cli_args.len(), 4);
    assert_eq!(config.timeouts.request_seconds, 30);
    assert_eq!(config.limits.max_line_bytes, 4096);
    assert_eq!(config.limits.channel_capacity, 8);
    assert_eq!(config.limits.max_concurrent_dispatches, 4);
    assert_eq!(config.permissions.default, DefaultBehavior::Allow);
    assert_eq!(config.permissions.allowed_tools, vec!["Read", "Grep"]);
    assert_eq!(config.permissions.denied_tools, vec!["Bash"]);
    assert_eq!(
        config.workspace_root,
        dir.path().canonicalize().expect("canonical tempdir")
    );
}

#[test]
fn minimal_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "host_cli = \"claude\"\nworkspace_root = '{}'\n",
        dir.path().to_string_lossy()
    );
    let config = ControlConfig::from_toml_str(&raw).expect("config parses");

    assert!(config.host_cli_args.is_empty());
    assert_eq!(config.request_timeout(), Duration::from_secs(60));
    assert_eq!(config.limits.max_line_bytes, 1_048_576);
    assert_eq!(config.limits.channel_capacity, 64);
    assert_eq!(config.limits.max_concurrent_dispatches, 0);
    assert_eq!(config.permissions.default, DefaultBehavior::Deny);
}

#[test]
fn rejects_empty_host_cli() {
    let err = ControlConfig::from_toml_str("host_cli = \"  \"\n").unwrap_err();
    assert_eq!(err, AppError::Config("host_cli must not be empty".into()));
}

#[test]
fn rejects_zero_request_timeout() {
    let raw = "host_cli = \"claude\"\n[timeouts]\nrequest_seconds = 0\n";
    let err = ControlConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("request_seconds")));
}

#[test]
fn rejects_zero_channel_capacity() {
    let raw = "host_cli = \"claude\"\n[limits]\nchannel_capacity = 0\n";
    let err = ControlConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("channel_capacity")));
}

#[test]
fn rejects_missing_workspace_root() {
    let raw = "host_cli = \"claude\"\nworkspace_root = '/definitely/not/here/agent-control'\n";
    let err = ControlConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("workspace_root invalid")));
}

#[test]
fn rejects_invalid_toml() {
    let err = ControlConfig::from_toml_str("host_cli = [").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml(&dir.path().to_string_lossy())).expect("write config");

    let config = ControlConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.host_cli, "claude");
}

#[test]
fn load_from_missing_path_fails() {
    let err = ControlConfig::load_from_path("/definitely/not/here/config.toml").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("failed to read config")));
}

#[test]
fn client_settings_follow_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ControlConfig::from_toml_str(&sample_toml(&dir.path().to_string_lossy()))
        .expect("config parses");

    let settings = ClientSettings::from(&config);
    assert_eq!(settings.request_timeout, Duration::from_secs(30));
    assert_eq!(settings.channel_capacity, 8);
    assert_eq!(settings.max_concurrent_dispatches, Some(4));
}

#[test]
fn zero_dispatch_cap_means_unbounded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "host_cli = \"claude\"\nworkspace_root = '{}'\n",
        dir.path().to_string_lossy()
    );
    let config = ControlConfig::from_toml_str(&raw).expect("config parses");
    assert_eq!(ClientSettings::from(&config).max_concurrent_dispatches, None);
    assert_eq!(ClientSettings::default().request_timeout, Duration::from_secs(60));
}
