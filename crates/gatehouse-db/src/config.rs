//! Store configuration: which providers exist and where they keep data.
//!
//! Loaded from a JSON file, then overlaid with the environment (a `.env`
//! file is honoured through `dotenvy`).

use std::env;
use std::path::{Path, PathBuf};

use gatehouse_core::{DriverConfig, PROVIDER_ENV};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`StoreConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "GATEHOUSE_DATA_DIR";

/// Data directory used when neither the file nor the environment sets one.
pub const DEFAULT_DATA_DIR: &str = ".gatehouse";

const SQLITE_FILE: &str = "gatehouse.db";
const JSON_DIR: &str = "json";

/// How to build one named provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Memory,
    Json {
        /// Defaults to `<data_dir>/json`.
        #[serde(default)]
        base_dir: Option<PathBuf>,
    },
    Sqlite {
        /// Defaults to `<data_dir>/gatehouse.db`.
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// Errors raised while loading or checking a [`StoreConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Provider '{provider}' used by {used_by} is not configured")]
    UnknownProvider { provider: String, used_by: String },
}

/// Providers plus the driver routing between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory for file-backed providers without explicit paths.
    pub data_dir: Option<PathBuf>,

    /// Providers by name, built in this order.
    pub providers: IndexMap<String, ProviderConfig>,

    pub driver: DriverConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut providers = IndexMap::new();
        providers.insert("memory".to_string(), ProviderConfig::Memory);
        Self {
            data_dir: None,
            providers,
            driver: DriverConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Read `path`, apply the environment overlay and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.apply_env();
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded store config"
        );
        Ok(config)
    }

    /// Defaults with the environment overlay applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `GATEHOUSE_DATA_DIR` and `GATEHOUSE_PROVIDER`, loading `.env`
    /// first if present.
    pub fn apply_env(&mut self) {
        dotenvy::dotenv().ok();
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Overlay values from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = value(DATA_DIR_ENV) {
            self.data_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(provider) = value(PROVIDER_ENV) {
            self.driver.default_provider = provider.trim().to_string();
        }
    }

    /// Every provider the driver refers to must be configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |provider: &str, used_by: String| {
            if self.providers.contains_key(provider) {
                Ok(())
            } else {
                Err(ConfigError::UnknownProvider {
                    provider: provider.to_string(),
                    used_by,
                })
            }
        };

        check(&self.driver.default_provider, "the default route".to_string())?;
        for (gateway, config) in &self.driver.gateways {
            if let Some(provider) = &config.provider {
                check(provider, format!("gateway '{gateway}'"))?;
            }
        }
        Ok(())
    }

    /// The effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Directory a JSON provider stores its tables in.
    pub fn json_dir(&self, base_dir: Option<&Path>) -> PathBuf {
        base_dir.map_or_else(|| self.data_dir().join(JSON_DIR), Path::to_path_buf)
    }

    /// Database file of a `SQLite` provider.
    pub fn sqlite_path(&self, path: Option<&Path>) -> PathBuf {
        path.map_or_else(|| self.data_dir().join(SQLITE_FILE), Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.driver.default_provider, "memory");
        assert_eq!(config.data_dir(), PathBuf::from(".gatehouse"));
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_tagged_providers() {
        let config: StoreConfig = serde_json::from_str(
            r#"{
                "data_dir": "/srv/settings",
                "providers": {
                    "files": { "type": "json" },
                    "db": { "type": "sqlite", "path": "/tmp/s.db" }
                },
                "driver": {
                    "default_provider": "files",
                    "gateways": { "users": { "provider": "db" } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.providers["files"], ProviderConfig::Json { base_dir: None });
        assert_eq!(
            config.json_dir(None),
            PathBuf::from("/srv/settings").join("json")
        );
        assert_eq!(
            config.sqlite_path(Some(Path::new("/tmp/s.db"))),
            PathBuf::from("/tmp/s.db")
        );
        assert_eq!(config.driver.provider_for("users"), "db");
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = StoreConfig {
            data_dir: Some(PathBuf::from("from-file")),
            ..StoreConfig::default()
        };
        let env: HashMap<&str, &str> =
            HashMap::from([(DATA_DIR_ENV, " /data "), (PROVIDER_ENV, "sqlite")]);
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.data_dir(), PathBuf::from("/data"));
        assert_eq!(config.driver.default_provider, "sqlite");
        assert_eq!(config.sqlite_path(None), PathBuf::from("/data").join("gatehouse.db"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut config = StoreConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.driver.default_provider, "memory");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = StoreConfig::default();
        config.driver = DriverConfig::default().with_gateway_provider("users", "redis");
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownProvider { ref provider, .. } if provider == "redis"
        ));
        assert!(err.to_string().contains("gateway 'users'"));
    }

    #[test]
    fn test_load_reports_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StoreConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            StoreConfig::load(&temp.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
