//! Configuration loading
//!
//! Config file resolution follows the usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ORCACHE_CONFIG` environment variable
//! 3. `<config_dir>/orcache/config.toml`
//! 4. Compiled defaults (no file)
//!
//! Registry credentials may additionally come from `ORCACHE_CLIENT_ID` /
//! `ORCACHE_CLIENT_SECRET`, which take precedence over the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "ORCACHE_CONFIG";
pub const CLIENT_ID_ENV_VAR: &str = "ORCACHE_CLIENT_ID";
pub const CLIENT_SECRET_ENV_VAR: &str = "ORCACHE_CLIENT_SECRET";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub org_registry: OrgRegistryConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data_local_dir>/orcache/orcache.db`
    pub path: Option<PathBuf>,
}

/// Person registry API endpoints and client credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    /// Profile documents (`{member_url}/{person}/record`)
    pub member_url: String,
    /// Expanded search (`{search_url}/expanded-search/`)
    pub search_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: "https://orcid.org/oauth/token".to_string(),
            member_url: "https://api.orcid.org/v3.0/".to_string(),
            search_url: "https://pub.orcid.org/v3.0/".to_string(),
        }
    }
}

/// Organization registry used to resolve legacy institution identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgRegistryConfig {
    pub base_url: String,
}

impl Default for OrgRegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ror.org".to_string(),
        }
    }
}

/// Tuning knobs for a rebuild run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Width of the profile fetch worker pool
    pub concurrency: usize,
    /// Search page size
    pub page_size: usize,
    /// Buffered rows per bulk insert
    pub flush_batch: usize,
    /// Profile summary upserts per commit
    pub profile_commit_batch: usize,
    pub max_retries: u32,
    /// Multiplied by the attempt number after a 429
    pub rate_limit_backoff_ms: u64,
    /// Multiplied by the attempt number after any other failure
    pub transient_backoff_ms: u64,
    /// Outbound request pacing; 0 disables
    pub requests_per_second: u32,
    /// Pause between search pages
    pub page_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            page_size: 1000,
            flush_batch: 2000,
            profile_commit_batch: 500,
            max_retries: 3,
            rate_limit_backoff_ms: 2000,
            transient_backoff_ms: 500,
            requests_per_second: 24,
            page_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Resolved database location
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    /// Fail fast when the registry cannot be reached with these settings
    pub fn validate_credentials(&self) -> Result<()> {
        let reg = &self.registry;
        let mut missing = Vec::new();

        if !is_set(reg.client_id.as_deref()) {
            missing.push("registry.client_id");
        }
        if !is_set(reg.client_secret.as_deref()) {
            missing.push("registry.client_secret");
        }
        if !is_set(Some(&reg.token_url)) {
            missing.push("registry.token_url");
        }
        if !is_set(Some(&reg.member_url)) {
            missing.push("registry.member_url");
        }
        if !is_set(Some(&reg.search_url)) {
            missing.push("registry.search_url");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Missing registry settings: {}. Set them in config.toml or via {} / {}",
                missing.join(", "),
                CLIENT_ID_ENV_VAR,
                CLIENT_SECRET_ENV_VAR
            )))
        }
    }

    /// Apply credential overrides from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Some(id) = env_value(CLIENT_ID_ENV_VAR) {
            if is_set(self.registry.client_id.as_deref()) {
                warn!(
                    "Registry client id found in both config file and {}. Using environment.",
                    CLIENT_ID_ENV_VAR
                );
            }
            self.registry.client_id = Some(id);
        }

        if let Some(secret) = env_value(CLIENT_SECRET_ENV_VAR) {
            if is_set(self.registry.client_secret.as_deref()) {
                warn!(
                    "Registry client secret found in both config file and {}. Using environment.",
                    CLIENT_SECRET_ENV_VAR
                );
            }
            self.registry.client_secret = Some(secret);
        }
    }
}

/// Locate the config file, if any
///
/// An explicit path (argument or environment) is returned even when it does
/// not exist so that `load_config` can report it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_value(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join("orcache").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration from `path` (or defaults), then apply env overrides
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Read {} failed: {}", path.display(), e))
            })?;
            info!("Loaded configuration from {}", path.display());
            TomlConfig::from_toml_str(&content)?
        }
        None => {
            info!("No configuration file found, using defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("orcache"))
        .unwrap_or_else(|| PathBuf::from("./orcache_data"))
        .join("orcache.db")
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_set(Some(v)))
}

fn is_set(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}
