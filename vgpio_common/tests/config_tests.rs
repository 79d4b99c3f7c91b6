//! Configuration file tests.
//!
//! Loading `CoreConfig` from disk: full file, partial file, missing file,
//! malformed TOML and semantic validation.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use vgpio_common::config::{ConfigError, ConfigLoader, CoreConfig, LogLevel};

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_config_loads() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "vgpio.toml",
        r#"
[shared]
service_name = "vgpio-bench"
log_level = "debug"

[engine]
reply_timeout_ms = 500

[lifecycle]
max_chips = 1

[transport]
listen = "127.0.0.1:47200"
peers = ["127.0.0.1:47201", "127.0.0.1:47202"]
poll_interval_ms = 20

[status]
path = "/tmp/vgpio-status.json"
interval_ms = 250
"#,
    );

    let config = CoreConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.shared.service_name, "vgpio-bench");
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.engine.reply_timeout_ms, 500);
    assert_eq!(config.lifecycle.max_chips, Some(1));
    assert_eq!(config.transport.peer_addrs().unwrap().len(), 2);
    assert_eq!(config.transport.poll_interval_ms, 20);
    assert_eq!(
        config.status.path.as_deref(),
        Some(Path::new("/tmp/vgpio-status.json"))
    );
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "vgpio.toml", "[engine]\nreply_timeout_ms = 100\n");

    let config = CoreConfig::load(&path).unwrap();
    assert_eq!(config.engine.reply_timeout_ms, 100);
    assert_eq!(config.lifecycle.max_chips, None);
    assert!(config.transport.peers.is_empty());
    assert!(config.status.path.is_none());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = CoreConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn test_malformed_toml() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "vgpio.toml", "[engine\nreply_timeout_ms = ");
    assert!(matches!(
        CoreConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_wrong_type_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "vgpio.toml",
        "[engine]\nreply_timeout_ms = \"soon\"\n",
    );
    assert!(matches!(
        CoreConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_validation_rejects_bad_listen_address() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "vgpio.toml", "[transport]\nlisten = \"nowhere\"\n");

    let config = CoreConfig::load(&path).unwrap();
    match config.validate() {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("transport.listen")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_validation_rejects_empty_service_name() {
    let config = CoreConfig::from_toml("[shared]\nservice_name = \"\"\n").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_sample_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/vgpio.toml");
    let config = CoreConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.engine.reply_timeout_ms, 2000);
}
