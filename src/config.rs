//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine database location; defaults to ~/.streakvault/engine.db
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Optional token required in the X-Streakvault-Token header.
    /// Empty or absent disables auth (local development).
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Seconds between expiry sweeps while serving
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            bind_addr: default_bind_addr(),
            auth_token: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from the default location (~/.streakvault/config.toml),
    /// falling back to defaults when no file exists
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        store::data_dir().join("config.toml")
    }

    /// Resolved database path
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(store::default_db_path)
    }

    /// Write this config as TOML
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8787");
        assert_eq!(config.sweep_interval_secs, 300);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.auth_token = Some("secret".to_string());
        config.db_path = Some(dir.path().join("engine.db"));
        config.write_to(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.auth_token.as_deref(), Some("secret"));
        assert_eq!(loaded.db_path, config.db_path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind_addr = \"0.0.0.0:9000\"\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.bind_addr, "0.0.0.0:9000");
        assert_eq!(loaded.sweep_interval_secs, 300);
    }
}
