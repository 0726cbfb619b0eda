//! Provider trait definition.
//!
//! A provider is the durable storage adapter behind a gateway. The core
//! never talks to a database directly: it asks the provider for rows and
//! hands it the list of changes produced by an update.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ProviderError;
use crate::schema::SchemaEntry;
use crate::settings::SettingsChange;
use crate::settings::tree::set_path;

/// A stored settings row: the entity `id` plus nested values.
pub type Row = Map<String, Value>;

/// How a provider stores rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Whole documents; no column bookkeeping needed.
    Schemaless,
    /// One column per schema entry; missing columns are added at init.
    SchemaOnWrite,
}

/// Durable storage for settings rows.
///
/// Tables are named after gateways. Rows returned by `get`/`get_all` carry
/// their id under the `"id"` key and nest folder values as objects.
///
/// # Design Rules
///
/// - `create`/`update` receive every change of one update call at once
/// - `delete` of a missing row is not an error
/// - `add_column`/`get_columns` only matter for `SchemaOnWrite` providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Storage model of this provider.
    fn kind(&self) -> ProviderKind;

    /// Prepare the provider (open files, connect pools, ...).
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Release resources.
    async fn shutdown(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool, ProviderError>;

    async fn create_table(&self, table: &str) -> Result<(), ProviderError>;

    /// Add a column for `entry` (schema-on-write providers only).
    async fn add_column(&self, _table: &str, _entry: &SchemaEntry) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Column names of `table`, excluding the id column.
    async fn get_columns(&self, _table: &str) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Fetch one row.
    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>, ProviderError>;

    /// Fetch many rows; `None` fetches the whole table.
    ///
    /// Ids without a row are simply absent from the result.
    async fn get_all(
        &self,
        table: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<Row>, ProviderError>;

    /// Insert a row for `id` holding `changes`; an existing row is merged into.
    async fn create(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError>;

    /// Apply `changes` to the existing row for `id`.
    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), ProviderError>;
}

/// Apply a change list to a nested row in place.
///
/// Shared by document-style providers.
pub fn apply_changes(row: &mut Row, changes: &[SettingsChange]) {
    for change in changes {
        set_path(row, change.path(), change.next.clone());
    }
}

/// Registry of providers by name.
///
/// Gateways keep only the provider name and resolve it here on every call.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Resolve a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::Unregistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Initialize every provider in registration order.
    pub async fn init_all(&self) -> Result<(), ProviderError> {
        for (name, provider) in &self.providers {
            provider.init().await?;
            tracing::info!(provider = %name, kind = ?provider.kind(), "Provider initialized");
        }
        Ok(())
    }

    /// Shut every provider down, reporting the first failure.
    pub async fn shutdown_all(&self) -> Result<(), ProviderError> {
        let mut first_error = None;
        for (name, provider) in &self.providers {
            if let Err(err) = provider.shutdown().await {
                tracing::warn!(provider = %name, error = %err, "Provider shutdown failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("names", &self.names())
            .finish()
    }
}
