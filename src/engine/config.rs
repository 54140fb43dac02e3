//! BundlePush Configuration Module
//! Handles loading and validating bundlepush.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::updater::verify::Ed25519SignatureVerifier;

pub const CONFIG_FILE_NAME: &str = "bundlepush.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Host-supplied settings for one install root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterConfig {
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_bundle_file_name")]
    pub bundle_file_name: String,
    /// Hex-encoded ed25519 public key. When set, every update must be signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Keep packages under a separate `TestPackages` root.
    #[serde(default)]
    pub test_configuration: bool,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    /// Applies separately to connect and to each read.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bundlepush")
}

fn default_bundle_file_name() -> String {
    "index.bundle".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    20
}

fn default_buffer_size() -> usize {
    256 * 1024
}

fn default_user_agent() -> String {
    format!("BundlePush-Updater/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            buffer_size: default_buffer_size(),
            retry_delay_ms: 0,
            user_agent: default_user_agent(),
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            bundle_file_name: default_bundle_file_name(),
            public_key: None,
            test_configuration: false,
            download: DownloadConfig::default(),
        }
    }
}

impl UpdaterConfig {
    pub fn for_root(storage_root: &Path) -> Self {
        Self {
            storage_root: storage_root.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: UpdaterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config if the file exists, otherwise fall back to defaults.
    pub fn load_or_default(config_path: &Path) -> Result<Self, ConfigError> {
        match Self::load(config_path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, config_path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.public_key {
            Ed25519SignatureVerifier::from_hex(key)?;
        }
        Ok(())
    }
}
