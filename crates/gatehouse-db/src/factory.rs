//! Composition utilities for building provider registries and drivers.
//!
//! Focused purely on construction: turn a [`StoreConfig`] into live
//! providers, and those into a [`GatewayDriver`]. No settings logic here.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

use gatehouse_core::{GatewayDriver, MemoryProvider, Provider, ProviderRegistry, SerializerRegistry};

use crate::config::{ProviderConfig, StoreConfig};
use crate::providers::{JsonProvider, SqliteProvider};
use crate::setup::connect_sqlite;

/// Factory for creating providers from configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build one provider. `SQLite` providers open their database here.
    pub async fn build_provider(
        config: &StoreConfig,
        provider: &ProviderConfig,
    ) -> anyhow::Result<Arc<dyn Provider>> {
        let built: Arc<dyn Provider> = match provider {
            ProviderConfig::Memory => Arc::new(MemoryProvider::new()),
            ProviderConfig::Json { base_dir } => {
                Arc::new(JsonProvider::new(config.json_dir(base_dir.as_deref())))
            }
            ProviderConfig::Sqlite { path } => {
                let path = config.sqlite_path(path.as_deref());
                let pool = connect_sqlite(&path)
                    .await
                    .with_context(|| format!("opening SQLite database {}", path.display()))?;
                Self::sqlite(pool)
            }
        };
        Ok(built)
    }

    /// Build every configured provider, keyed by its configured name.
    pub async fn build_registry(config: &StoreConfig) -> anyhow::Result<ProviderRegistry> {
        config.validate()?;

        let mut registry = ProviderRegistry::new();
        for (name, provider) in &config.providers {
            let built = Self::build_provider(config, provider)
                .await
                .with_context(|| format!("building provider '{name}'"))?;
            registry.register(name.clone(), built);
        }

        tracing::info!(providers = ?registry.names(), "Built provider registry");
        Ok(registry)
    }

    /// Build a driver over the configured providers and the built-in
    /// serializers. Gateways still have to be registered and initialized.
    pub async fn build_driver(config: &StoreConfig) -> anyhow::Result<GatewayDriver> {
        let providers = Self::build_registry(config).await?;
        Ok(GatewayDriver::new(
            SerializerRegistry::with_defaults(),
            providers,
            config.driver.clone(),
        ))
    }

    /// Create a `SQLite` provider from a pool.
    pub fn sqlite(pool: SqlitePool) -> Arc<SqliteProvider> {
        Arc::new(SqliteProvider::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::ProviderKind;
    use indexmap::IndexMap;

    #[tokio::test]
    async fn test_build_registry_from_config() {
        let temp = tempfile::tempdir().unwrap();
        let mut providers = IndexMap::new();
        providers.insert("memory".to_string(), ProviderConfig::Memory);
        providers.insert("files".to_string(), ProviderConfig::Json { base_dir: None });
        providers.insert("db".to_string(), ProviderConfig::Sqlite { path: None });
        let config = StoreConfig {
            data_dir: Some(temp.path().to_path_buf()),
            providers,
            ..StoreConfig::default()
        };

        let registry = ProviderFactory::build_registry(&config).await.unwrap();
        assert_eq!(registry.names().len(), 3);
        assert_eq!(registry.get("db").unwrap().kind(), ProviderKind::SchemaOnWrite);
        assert_eq!(registry.get("files").unwrap().kind(), ProviderKind::Schemaless);
        assert!(temp.path().join("gatehouse.db").exists());
    }

    #[tokio::test]
    async fn test_build_registry_rejects_unknown_route() {
        let mut config = StoreConfig::default();
        config.driver.default_provider = "files".to_string();
        let err = ProviderFactory::build_registry(&config).await.unwrap_err();
        assert!(err.to_string().contains("'files'"));
    }
}
