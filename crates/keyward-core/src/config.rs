//! Service configuration, loaded from a TOML file and overridable by
//! environment variables on each binary's `clap` CLI struct.
//!
//! Grounded on [`blueprint_webhooks::WebhookConfig::from_toml`]'s
//! load-then-validate shape: a fallible `from_toml` constructor plus a
//! separate `validate` that can also be called on a struct built directly
//! (e.g. from `clap(env)` fields merged over the file).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub server: String,
    #[serde(default)]
    pub verification_server: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    /// Root directory vault backups are written under (`<root>/<pub>.bak`).
    pub vaults_file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_key: String,
    #[serde(default = "default_sending_domain")]
    pub sending_domain: String,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default = "default_email_gateway_url")]
    pub gateway_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub blob_store: BlobStoreConfig,
    pub email: EmailConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_cache_host(),
            port: default_cache_port(),
            db: 0,
            password: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

fn default_cache_host() -> String {
    "127.0.0.1".to_string()
}
fn default_cache_port() -> u16 {
    6379
}
fn default_listen_port() -> u16 {
    8080
}
fn default_worker_concurrency() -> usize {
    4
}
fn default_sending_domain() -> String {
    "keyward.example".to_string()
}
fn default_template_name() -> String {
    "fastvault".to_string()
}
fn default_email_gateway_url() -> String {
    "https://mandrillapp.com/api/1.0/messages/send-template".to_string()
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.server.is_empty() {
            return Err(ConfigError::Invalid("relay.server is required".into()));
        }
        if self.blob_store.vaults_file_path.is_empty() {
            return Err(ConfigError::Invalid(
                "blob_store.vaults_file_path is required".into(),
            ));
        }
        if self.email.api_key.is_empty() {
            return Err(ConfigError::Invalid("email.api_key is required".into()));
        }
        if self.server.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "server.worker_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The Redis connection string derived from the cache section.
    pub fn cache_url(&self) -> String {
        match &self.cache.password {
            Some(pw) if !pw.is_empty() => format!(
                "redis://:{pw}@{}:{}/{}",
                self.cache.host, self.cache.port, self.cache.db
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.cache.host, self.cache.port, self.cache.db
            ),
        }
    }
}
