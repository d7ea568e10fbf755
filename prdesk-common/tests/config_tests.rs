//! Unit tests for bootstrap configuration and root folder resolution
//!
//! Uses serial_test to prevent ENV variable races: tests that touch
//! PRDESK_ROOT_FOLDER are marked #[serial].

use prdesk_common::config::{
    default_root_folder, load_toml_config, prepare_root_folder, resolve_root_folder,
    write_toml_config, TomlConfig, DATABASE_FILE, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_defaults_when_config_file_missing() {
    let config = load_toml_config(Path::new("/nonexistent/prdesk/prdesk-ingest.toml")).unwrap();

    assert_eq!(config.port, 5740);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.llm.provider, "none");
    assert_eq!(config.llm.timeout_secs, 20);
    assert_eq!(config.parsing.default_timezone, "America/New_York");
    assert!(config.webhook.shared_secret.is_none());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prdesk-ingest.toml");
    std::fs::write(
        &path,
        r#"
port = 6000

[webhook]
shared_secret = "s3cret"

[llm]
provider = "anthropic"
model = "claude-3-haiku"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, 6000);
    assert_eq!(config.webhook.shared_secret.as_deref(), Some("s3cret"));
    assert_eq!(config.llm.provider, "anthropic");
    assert_eq!(config.llm.model.as_deref(), Some("claude-3-haiku"));
    assert_eq!(config.llm.timeout_secs, 20);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_write_then_load_preserves_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prdesk-ingest.toml");

    let mut config = TomlConfig::default();
    config.webhook.shared_secret = Some("abc".to_string());
    config.parsing.default_timezone = "America/Chicago".to_string();

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded.webhook.shared_secret.as_deref(), Some("abc"));
    assert_eq!(loaded.parsing.default_timezone, "America/Chicago");
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/prdesk-env");
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/tmp/prdesk-toml"));

    let root = resolve_root_folder(Some(Path::new("/tmp/prdesk-cli")), &config);
    assert_eq!(root, PathBuf::from("/tmp/prdesk-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/prdesk-env");
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/tmp/prdesk-toml"));

    let root = resolve_root_folder(None, &config);
    assert_eq!(root, PathBuf::from("/tmp/prdesk-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/tmp/prdesk-toml"));
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/prdesk-toml")
    );

    let config = TomlConfig::default();
    assert_eq!(resolve_root_folder(None, &config), default_root_folder());
}

#[test]
fn test_prepare_root_folder_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("prdesk-root");

    let first = prepare_root_folder(&root).unwrap();
    let second = prepare_root_folder(&root).unwrap();

    assert!(root.is_dir());
    assert_eq!(first, root.join(DATABASE_FILE));
    assert_eq!(first, second);
}
