//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_MODELS_DIR: &str = "models";

/// CLI configuration, `~/.config/opsguard/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent endpoint URL
    pub api_url: Option<String>,
    /// Directory holding trained model artifacts
    pub models_dir: Option<PathBuf>,
    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("opsguard").join("config.json"))
    }

    /// Flag or env value first, then the file, then the built-in default
    pub fn api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn models_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.models_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.api_url(None), DEFAULT_API_URL);
        assert_eq!(config.models_dir(None), PathBuf::from(DEFAULT_MODELS_DIR));
    }

    #[test]
    fn test_flag_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_url": "http://agent:9000", "models_dir": "/srv/models", "default_format": "json"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url(None), "http://agent:9000");
        assert_eq!(config.api_url(Some("http://other".into())), "http://other");
        assert_eq!(config.models_dir(None), PathBuf::from("/srv/models"));
        assert_eq!(config.default_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
