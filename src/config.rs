//! Store configuration
//!
//! Configuration lives in `/.sitedb/config.yaml` next to the collections.
//! A missing file means defaults. Two environment variables override the
//! generation endpoint and model without touching the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::site::BusinessProfile;

/// Environment override for [`GenerationConfig::endpoint`]
pub const ENDPOINT_ENV: &str = "SITEDB_GENERATION_ENDPOINT";
/// Environment override for [`GenerationConfig::model`]
pub const MODEL_ENV: &str = "SITEDB_GENERATION_MODEL";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Profile shown while no business profile has been stored
    #[serde(default)]
    pub profile: BusinessProfile,
}

/// Git history settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Commit every store write to the local git history
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Generation service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on a single generation call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "SITEDB_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Path of the config file under a store root
    pub fn path(root: &Path) -> PathBuf {
        root.join(".sitedb").join("config.yaml")
    }

    /// Load configuration from the store root, applying environment overrides
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| Error::FileReadError { path: path.clone(), source })?;
            serde_yaml::from_str(&content).map_err(|e| Error::Config {
                message: format!("{}: {}", path.display(), e),
            })?
        } else {
            Config::default()
        };

        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            config.generation.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.generation.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Write configuration to the store root
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|source| Error::FileWriteError { path, source })
    }

    fn validate(&self) -> Result<()> {
        if self.generation.timeout_secs == 0 {
            return Err(Error::Config {
                message: "generation.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.generation.endpoint.trim().is_empty() {
            return Err(Error::Config {
                message: "generation.endpoint cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert!(config.history.enabled);
        assert_eq!(config.generation.timeout_secs, 60);
        assert_eq!(config.profile.name, "Fast Fix Tech Repair");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.history.enabled = false;
        config.generation.timeout_secs = 5;
        config.profile.name = "Corner Repairs".to_string();
        config.save(tmp.path()).unwrap();

        let loaded = Config::load(tmp.path()).unwrap();
        assert!(!loaded.history.enabled);
        assert_eq!(loaded.generation.timeout_secs, 5);
        assert_eq!(loaded.profile.name, "Corner Repairs");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".sitedb")).unwrap();
        std::fs::write(
            Config::path(tmp.path()),
            "generation:\n  model: local-model\n",
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.generation.model, "local-model");
        assert_eq!(config.generation.api_key_env, "SITEDB_API_KEY");
        assert!(config.history.enabled);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".sitedb")).unwrap();
        std::fs::write(Config::path(tmp.path()), "generation:\n  timeout_secs: 0\n").unwrap();

        assert!(matches!(Config::load(tmp.path()), Err(Error::Config { .. })));
    }
}
