//! JSON-file implementation of the `Provider` trait.
//!
//! Layout: `<base>/<table>/<id>.json`, one pretty-printed nested document
//! per row. Writes go to a sibling temp file that is then renamed over the
//! target, so readers never see a half-written row.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use gatehouse_core::{Provider, ProviderError, ProviderKind, Row, SettingsChange, apply_changes};

const EXTENSION: &str = "json";

/// Schemaless provider storing one JSON file per row.
#[derive(Debug, Clone)]
pub struct JsonProvider {
    base_dir: PathBuf,
}

impl JsonProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn table_dir(&self, table: &str) -> Result<PathBuf, ProviderError> {
        validate_name(table)?;
        Ok(self.base_dir.join(table))
    }

    fn row_path(&self, table: &str, id: &str) -> Result<PathBuf, ProviderError> {
        validate_name(id)?;
        Ok(self.table_dir(table)?.join(format!("{id}.{EXTENSION}")))
    }

    async fn require_table(&self, table: &str) -> Result<PathBuf, ProviderError> {
        let dir = self.table_dir(table)?;
        if is_dir(&dir).await? {
            Ok(dir)
        } else {
            Err(ProviderError::TableMissing(table.to_string()))
        }
    }

    async fn read_row(&self, path: &Path) -> Result<Option<Row>, ProviderError> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, &e)),
        };
        match serde_json::from_str(&text) {
            Ok(Value::Object(row)) => Ok(Some(row)),
            Ok(other) => Err(ProviderError::Serialization(format!(
                "{}: expected an object, found {other}",
                path.display()
            ))),
            Err(e) => Err(ProviderError::Serialization(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    async fn write_row(&self, path: &Path, row: &Row) -> Result<(), ProviderError> {
        let text = serde_json::to_string_pretty(row)
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;
        let temp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&temp, text)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        fs::rename(&temp, path)
            .await
            .map_err(|e| io_error(path, &e))
    }
}

/// Table names and ids become file names: keep them to a safe alphabet.
fn validate_name(name: &str) -> Result<(), ProviderError> {
    let safe = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe {
        Ok(())
    } else {
        Err(ProviderError::InvalidId(name.to_string()))
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> ProviderError {
    ProviderError::Storage(format!("{}: {err}", path.display()))
}

async fn is_dir(path: &Path) -> Result<bool, ProviderError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, &e)),
    }
}

#[async_trait]
impl Provider for JsonProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Schemaless
    }

    async fn init(&self) -> Result<(), ProviderError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| io_error(&self.base_dir, &e))?;
        tracing::info!(path = %self.base_dir.display(), "JSON settings directory ready");
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool, ProviderError> {
        is_dir(&self.table_dir(table)?).await
    }

    async fn create_table(&self, table: &str) -> Result<(), ProviderError> {
        let dir = self.table_dir(table)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, &e))
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>, ProviderError> {
        self.require_table(table).await?;
        self.read_row(&self.row_path(table, id)?).await
    }

    async fn get_all(
        &self,
        table: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<Row>, ProviderError> {
        let dir = self.require_table(table).await?;

        let mut paths = Vec::new();
        match ids {
            // An id that cannot name a file has no row.
            Some(ids) => {
                for id in ids {
                    if validate_name(id).is_ok() {
                        paths.push(dir.join(format!("{id}.{EXTENSION}")));
                    } else {
                        tracing::debug!(table = %table, id = %id, "Skipping unstorable settings id");
                    }
                }
            }
            None => {
                let mut entries = fs::read_dir(&dir).await.map_err(|e| io_error(&dir, &e))?;
                while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, &e))? {
                    let path = entry.path();
                    if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
                        paths.push(path);
                    }
                }
            }
        }
        paths.sort();
        paths.dedup();

        let mut rows = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(row) = self.read_row(&path).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn create(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        self.require_table(table).await?;
        let path = self.row_path(table, id)?;

        let mut row = match self.read_row(&path).await? {
            Some(row) => row,
            None => {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::String(id.to_string()));
                row
            }
        };
        apply_changes(&mut row, changes);
        self.write_row(&path, &row).await?;

        tracing::debug!(table = %table, id = %id, "Wrote settings file");
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        self.require_table(table).await?;
        let path = self.row_path(table, id)?;
        let mut row = self
            .read_row(&path)
            .await?
            .ok_or_else(|| ProviderError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        apply_changes(&mut row, changes);
        self.write_row(&path, &row).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ProviderError> {
        let path = self.row_path(table, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        }
    }
}
