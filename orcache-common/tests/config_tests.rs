//! Unit tests for configuration loading
//!
//! Covers defaults, TOML parsing, config path priority, credential
//! validation and environment overrides.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate ORCACHE_* variables are marked with #[serial].

use orcache_common::config::{
    load_config, resolve_config_path, TomlConfig, CLIENT_ID_ENV_VAR, CLIENT_SECRET_ENV_VAR,
    CONFIG_ENV_VAR,
};
use orcache_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(CLIENT_ID_ENV_VAR);
    env::remove_var(CLIENT_SECRET_ENV_VAR);
}

#[test]
fn test_defaults_match_documented_values() {
    let config = TomlConfig::default();

    assert_eq!(config.sync.concurrency, 10);
    assert_eq!(config.sync.page_size, 1000);
    assert_eq!(config.sync.flush_batch, 2000);
    assert_eq!(config.sync.profile_commit_batch, 500);
    assert_eq!(config.sync.max_retries, 3);
    assert_eq!(config.sync.rate_limit_backoff_ms, 2000);
    assert_eq!(config.sync.transient_backoff_ms, 500);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.org_registry.base_url, "https://api.ror.org");
    assert!(config.registry.client_id.is_none());
}

#[test]
fn test_partial_toml_keeps_defaults_for_missing_fields() {
    let config = TomlConfig::from_toml_str(
        r#"
        [registry]
        client_id = "APP-123"
        client_secret = "s3cret"

        [sync]
        concurrency = 4
        "#,
    )
    .unwrap();

    assert_eq!(config.registry.client_id.as_deref(), Some("APP-123"));
    assert_eq!(config.registry.token_url, "https://orcid.org/oauth/token");
    assert_eq!(config.sync.concurrency, 4);
    assert_eq!(config.sync.page_size, 1000);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let result = TomlConfig::from_toml_str("[sync\nconcurrency = ");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_validate_credentials_lists_missing_fields() {
    let mut config = TomlConfig::default();
    config.registry.member_url = "  ".to_string();

    let err = config.validate_credentials().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("registry.client_id"));
    assert!(message.contains("registry.client_secret"));
    assert!(message.contains("registry.member_url"));
    assert!(!message.contains("registry.search_url"));
}

#[test]
fn test_validate_credentials_accepts_complete_config() {
    let mut config = TomlConfig::default();
    config.registry.client_id = Some("APP-123".to_string());
    config.registry.client_secret = Some("s3cret".to_string());
    assert!(config.validate_credentials().is_ok());
}

#[test]
fn test_database_path_prefers_configured_value() {
    let mut config = TomlConfig::default();
    assert!(config.database_path().ends_with("orcache.db"));

    config.database.path = Some(PathBuf::from("/tmp/custom.db"));
    assert_eq!(config.database_path(), PathBuf::from("/tmp/custom.db"));
}

#[test]
#[serial]
fn test_cli_path_wins_over_env() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));
    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/from-env.toml"))
    );

    clear_env();
}

#[test]
#[serial]
fn test_load_config_reports_missing_explicit_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let result = load_config(Some(&missing));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_credentials_override_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [registry]
        client_id = "FILE-ID"
        client_secret = "file-secret"
        "#,
    )
    .unwrap();

    env::set_var(CLIENT_ID_ENV_VAR, "ENV-ID");

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.registry.client_id.as_deref(), Some("ENV-ID"));
    assert_eq!(config.registry.client_secret.as_deref(), Some("file-secret"));

    clear_env();
}

#[test]
#[serial]
fn test_blank_env_credentials_are_ignored() {
    clear_env();
    env::set_var(CLIENT_SECRET_ENV_VAR, "   ");

    let config = load_config(None).unwrap();
    assert!(config.registry.client_secret.is_none());

    clear_env();
}
