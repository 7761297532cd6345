//! Local client settings: where to find the runtime configuration and how
//! to talk to the network. Distinct from the remote `RuntimeConfig`.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `<config dir>/rym/config.yaml`, if present
//! 3. `RYM_CONFIG_URL`, `RYM_HTTP_TIMEOUT_SECS`, `RYM_KEYRING_SERVICE`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_URL: &str = "http://localhost:5173/config.json";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_KEYRING_SERVICE: &str = "rym";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk shape of `config.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsYaml {
    pub config_url: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub keyring_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Location of the runtime configuration JSON.
    pub config_url: String,
    pub http_timeout: Duration,
    /// Keyring service the credential is stored under.
    pub keyring_service: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            config_url: DEFAULT_CONFIG_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl ClientSettings {
    /// Defaults, then the settings file, then the environment.
    pub fn load() -> Result<Self, SettingsError> {
        let settings = match Self::settings_path() {
            Some(path) if path.exists() => {
                info!("Loading settings from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        settings.with_env(|key| std::env::var(key).ok())
    }

    /// `<config dir>/rym/config.yaml`
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rym").join("config.yaml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let yaml: SettingsYaml = serde_yaml::from_str(&text).map_err(|e| {
            SettingsError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Self::default().with_yaml(yaml))
    }

    fn with_yaml(mut self, yaml: SettingsYaml) -> Self {
        if let Some(url) = yaml.config_url {
            self.config_url = url;
        }
        if let Some(secs) = yaml.http_timeout_secs {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(service) = yaml.keyring_service {
            self.keyring_service = service;
        }
        self
    }

    /// Apply `RYM_*` overrides found through `lookup`.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = set("RYM_CONFIG_URL") {
            self.config_url = url;
        }
        if let Some(secs) = set("RYM_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                SettingsError::Config(format!("RYM_HTTP_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(service) = set("RYM_KEYRING_SERVICE") {
            self.keyring_service = service;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn yaml_keys_are_optional() {
        let yaml: SettingsYaml = serde_yaml::from_str("http_timeout_secs: 5\n").unwrap();
        assert_eq!(yaml.http_timeout_secs, Some(5));
        assert!(yaml.config_url.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "config_url: https://rym.example/config.json\nkeyring_service: rym-test\n",
        )
        .unwrap();

        let settings = ClientSettings::from_file(&path).unwrap();
        assert_eq!(settings.config_url, "https://rym.example/config.json");
        assert_eq!(settings.keyring_service, "rym-test");
        assert_eq!(
            settings.http_timeout,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
    }

    #[test]
    fn empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(
            ClientSettings::from_file(&path).unwrap(),
            ClientSettings::default()
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "http_timeout_secs: [1, 2]\n").unwrap();
        assert!(matches!(
            ClientSettings::from_file(&path),
            Err(SettingsError::Serialization(_))
        ));
    }

    #[test]
    fn env_overrides_file() {
        let settings = ClientSettings::default()
            .with_env(env(&[
                ("RYM_CONFIG_URL", "http://127.0.0.1:9000/config.json"),
                ("RYM_HTTP_TIMEOUT_SECS", "7"),
                ("RYM_KEYRING_SERVICE", ""),
            ]))
            .unwrap();
        assert_eq!(settings.config_url, "http://127.0.0.1:9000/config.json");
        assert_eq!(settings.http_timeout, Duration::from_secs(7));
        assert_eq!(settings.keyring_service, DEFAULT_KEYRING_SERVICE);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let result = ClientSettings::default().with_env(env(&[("RYM_HTTP_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(SettingsError::Config(_))));
    }
}
