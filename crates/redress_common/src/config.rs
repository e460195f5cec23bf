//! Configuration management for redressd.
//!
//! Loads settings from /etc/redress/config.toml or uses defaults, then
//! applies `REDRESS_*` environment overrides.

use crate::credentials::DEFAULT_ITERATIONS;
use crate::store::DbLocation;
use crate::token::DEFAULT_TTL_DAYS;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/redress/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/redress/config.toml";

/// Secret shipped in the defaults; tokens signed with it are forgeable
pub const INSECURE_DEFAULT_SECRET: &str = "redress-development-secret";

/// Special database path selecting a private in-memory database
pub const IN_MEMORY_DB: &str = ":memory:";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Browser origin allowed by CORS
    #[serde(default = "default_client_url")]
    pub client_url: String,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_client_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            client_url: default_client_url(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "/var/lib/redress/redress.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn location(&self) -> DbLocation {
        if self.path == IN_MEMORY_DB {
            DbLocation::InMemory
        } else {
            DbLocation::Path(PathBuf::from(&self.path))
        }
    }
}

/// Session and credential settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for session tokens
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Session lifetime in days
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,

    /// PBKDF2 rounds for new password hashes
    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,
}

fn default_token_secret() -> String {
    INSECURE_DEFAULT_SECRET.to_string()
}

fn default_token_ttl_days() -> i64 {
    DEFAULT_TTL_DAYS
}

fn default_hash_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_days: default_token_ttl_days(),
            hash_iterations: default_hash_iterations(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"***")
            .field("token_ttl_days", &self.token_ttl_days)
            .field("hash_iterations", &self.hash_iterations)
            .finish()
    }
}

impl AuthConfig {
    pub fn uses_insecure_secret(&self) -> bool {
        self.token_secret == INSECURE_DEFAULT_SECRET
    }
}

/// Per-client request limit on `/api`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    100
}

fn default_window_secs() -> u64 {
    15 * 60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load config from the standard locations, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Explicit path if given (must exist), otherwise the standard lookup.
    /// Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `REDRESS_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                info!("{} overrides configured value", key);
                *target = value;
            }
        };
        set("REDRESS_BIND", &mut self.server.bind);
        set("REDRESS_DB", &mut self.database.path);
        set("REDRESS_TOKEN_SECRET", &mut self.auth.token_secret);
        set("REDRESS_CLIENT_URL", &mut self.server.client_url);
    }

    /// Write the defaults to `path`
    pub fn save_default(path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.client_url, "http://localhost:5173");
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.auth.token_ttl_days, 30);
        assert!(config.auth.uses_insecure_secret());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[server]
bind = "0.0.0.0:8080"

[rate_limit]
max_requests = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.rate_limit.max_requests, 5);
        // Defaults for missing fields
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.server.max_body_bytes, 64 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REDRESS_DB", ":memory:"),
            ("REDRESS_TOKEN_SECRET", "s3cret"),
            ("REDRESS_BIND", "   "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.location(), DbLocation::InMemory);
        assert_eq!(config.auth.token_secret, "s3cret");
        // blank values are ignored
        assert_eq!(config.server.bind, default_bind());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc").join("config.toml");
        Config::save_default(&path).unwrap();
        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.database.path, default_db_path());
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(Config::resolve(Some(&temp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_debug_masks_secret() {
        let config = Config::default();
        assert!(!format!("{:?}", config).contains(INSECURE_DEFAULT_SECRET));
    }
}
