//! Client configuration management.
//!
//! Configuration is stored at `~/.config/querydesk/config.json` and can be
//! overridden from the environment (`API_BASE_URL`, `API_ORIGIN`,
//! `QUERYDESK_TIMEOUT_SECS`, `QUERYDESK_STORAGE`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileStorage, KeyringStorage, MemoryStorage, StorageBackend};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "querydesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base path, resolved against the origin when relative
pub const DEFAULT_API_BASE_URL: &str = "/api";

/// Origin used to resolve a relative API base path
pub const DEFAULT_API_ORIGIN: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the credential pair is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown storage kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub api_origin: String,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    pub credentials_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage: StorageKind::default(),
            credentials_path: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when missing), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = base.trim().to_string();
        }
        if let Some(origin) = lookup("API_ORIGIN").filter(|v| !v.trim().is_empty()) {
            self.api_origin = origin.trim().to_string();
        }
        if let Some(timeout) = lookup("QUERYDESK_TIMEOUT_SECS") {
            self.request_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid QUERYDESK_TIMEOUT_SECS: {}", timeout))?;
        }
        if let Some(storage) = lookup("QUERYDESK_STORAGE") {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    /// Absolute API base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        if base.starts_with('/') || base.is_empty() {
            format!("{}{}", self.api_origin.trim_end_matches('/'), base)
        } else {
            base.to_string()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the configured credential backend.
    pub fn open_storage(&self) -> Result<Box<dyn StorageBackend>> {
        Ok(match self.storage {
            StorageKind::File => {
                let path = match self.credentials_path {
                    Some(ref path) => path.clone(),
                    None => FileStorage::default_path()?,
                };
                Box::new(FileStorage::new(path))
            }
            StorageKind::Keyring => Box::new(KeyringStorage::default()),
            StorageKind::Memory => Box::new(MemoryStorage::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_base_url_is_resolved_against_origin() {
        let config = Config::default();
        assert_eq!(config.base_url(), "http://localhost:8080/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("API_BASE_URL", "https://desk.example.com/api/"),
                ("QUERYDESK_TIMEOUT_SECS", "5"),
                ("QUERYDESK_STORAGE", "Memory"),
            ]))
            .unwrap();
        assert_eq!(config.base_url(), "https://desk.example.com/api");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn test_relative_base_with_custom_origin() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("API_BASE_URL", "/v2"), ("API_ORIGIN", "https://desk.example.com/")]))
            .unwrap();
        assert_eq!(config.base_url(), "https://desk.example.com/v2");
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("QUERYDESK_TIMEOUT_SECS", "soon")])).is_err());
        assert!(config.apply_env(env(&[("QUERYDESK_STORAGE", "cloud")])).is_err());
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage":"keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageKind::Keyring);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }
}
