//! In-memory provider.
//!
//! Schemaless: rows are nested JSON objects kept in a table map. Useful
//! for tests and for gateways that do not need to outlive the process.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::ports::{Provider, ProviderError, ProviderKind, Row, apply_changes};
use crate::settings::SettingsChange;

type Table = HashMap<String, Row>;

/// Provider keeping every table in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw row as-is, replacing any row with the same id.
    ///
    /// The row must carry its id under `"id"`; the table is created on
    /// demand. Meant for seeding fixtures and migrations.
    pub async fn insert_row(&self, table: &str, row: Row) -> Result<(), ProviderError> {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidId(format!("row without id in {table}")))?
            .to_string();
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// Number of rows in `table` (0 if it does not exist).
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, HashMap::len)
    }
}

fn missing(table: &str) -> ProviderError {
    ProviderError::TableMissing(table.to_string())
}

#[async_trait]
impl Provider for MemoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Schemaless
    }

    async fn has_table(&self, table: &str) -> Result<bool, ProviderError> {
        Ok(self.tables.read().await.contains_key(table))
    }

    async fn create_table(&self, table: &str) -> Result<(), ProviderError> {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>, ProviderError> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(rows.get(id).cloned())
    }

    async fn get_all(
        &self,
        table: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<Row>, ProviderError> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| missing(table))?;

        let mut found: Vec<Row> = match ids {
            Some(ids) => ids.iter().filter_map(|id| rows.get(id).cloned()).collect(),
            None => rows.values().cloned().collect(),
        };
        found.sort_by(|a, b| {
            let id = |row: &Row| row.get("id").and_then(Value::as_str).map(str::to_owned);
            id(a).cmp(&id(b))
        });
        found.dedup_by(|a, b| a.get("id") == b.get("id"));
        Ok(found)
    }

    async fn create(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing(table))?;

        let row = rows.entry(id.to_string()).or_insert_with(|| {
            let mut row = Row::new();
            row.insert("id".to_string(), Value::String(id.to_string()));
            row
        });
        apply_changes(row, changes);
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing(table))?;
        let row = rows.get_mut(id).ok_or_else(|| ProviderError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        apply_changes(row, changes);
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ProviderError> {
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }
}
