//! `SQLite` implementation of the `Provider` trait.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, SqlitePool};

use gatehouse_core::settings::tree::set_path;
use gatehouse_core::{Provider, ProviderError, ProviderKind, Row, SchemaEntry, SettingsChange};

const ID_COLUMN: &str = "id";

/// `SQLite` implementation of the `Provider` trait.
///
/// Schema-on-write: each gateway table has an `id` primary key and one
/// `TEXT` column per entry path (`roles.admin`), holding the value as JSON.
/// `NULL` columns are left out of the rows handed back to the core.
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Create a new `SQLite` provider.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn exists(&self, table: &str, id: &str) -> Result<bool, ProviderError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", quote(table));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        Ok(row.is_some())
    }
}

/// Quote an identifier; embedded quotes are doubled.
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn storage(table: &str, err: &sqlx::Error) -> ProviderError {
    let message = err.to_string();
    if message.contains("no such table") {
        ProviderError::TableMissing(table.to_string())
    } else {
        ProviderError::Storage(message)
    }
}

fn encode(value: &Value) -> Result<Option<String>, ProviderError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::to_string(value)
        .map(Some)
        .map_err(|e| ProviderError::Serialization(e.to_string()))
}

/// Rebuild a nested row from the flat column layout.
fn decode(row: &SqliteRow) -> Result<Row, ProviderError> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw: Option<String> = row
            .try_get(index)
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        let Some(raw) = raw else { continue };

        if name == ID_COLUMN {
            decoded.insert(ID_COLUMN.to_string(), Value::String(raw));
            continue;
        }
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::Serialization(format!("column '{name}': {e}")))?;
        set_path(&mut decoded, name, value);
    }
    Ok(decoded)
}

#[async_trait]
impl Provider for SqliteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SchemaOnWrite
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        self.pool.close().await;
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool, ProviderError> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        Ok(row.is_some())
    }

    async fn create_table(&self, table: &str) -> Result<(), ProviderError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY NOT NULL)",
            quote(table)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        Ok(())
    }

    async fn add_column(&self, table: &str, entry: &SchemaEntry) -> Result<(), ProviderError> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote(table),
            quote(entry.path())
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        Ok(())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>, ProviderError> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name"))
            .filter(|name| !matches!(name.as_deref(), Ok(ID_COLUMN)))
            .collect::<Result<_, _>>()
            .map_err(|e| ProviderError::Storage(e.to_string()))
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>, ProviderError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", quote(table));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn get_all(
        &self,
        table: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<Row>, ProviderError> {
        let rows = match ids {
            None => {
                let sql = format!("SELECT * FROM {} ORDER BY id", quote(table));
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM {} WHERE id IN ({placeholders}) ORDER BY id",
                    quote(table)
                );
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id.as_str());
                }
                query.fetch_all(&self.pool).await
            }
        }
        .map_err(|e| storage(table, &e))?;

        rows.iter().map(decode).collect()
    }

    async fn create(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        let mut columns = vec![quote(ID_COLUMN)];
        columns.extend(changes.iter().map(|change| quote(change.path())));
        let placeholders = vec!["?"; columns.len()].join(", ");
        let conflict = if changes.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments: Vec<String> = columns[1..]
                .iter()
                .map(|column| format!("{column} = excluded.{column}"))
                .collect();
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT ({}) {conflict}",
            quote(table),
            columns.join(", "),
            quote(ID_COLUMN)
        );

        let mut query = sqlx::query(&sql).bind(id);
        for change in changes {
            query = query.bind(encode(&change.next)?);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;

        tracing::debug!(table = %table, id = %id, columns = changes.len(), "Upserted settings row");
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        let not_found = || ProviderError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        };
        if changes.is_empty() {
            return if self.exists(table, id).await? {
                Ok(())
            } else {
                Err(not_found())
            };
        }

        let assignments: Vec<String> = changes
            .iter()
            .map(|change| format!("{} = ?", quote(change.path())))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            quote(table),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for change in changes {
            query = query.bind(encode(&change.next)?);
        }
        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ProviderError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", quote(table));
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage(table, &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::connect_in_memory;
    use gatehouse_core::{EntryOptions, Schema, SerializerRegistry};
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add("prefix", "string", EntryOptions::new())
            .unwrap()
            .add("disabled", "string", EntryOptions::new().array())
            .unwrap()
            .add_folder("roles", |roles| {
                roles.add("admin", "string", EntryOptions::new())?;
                Ok(())
            })
            .unwrap();
        schema.freeze(&SerializerRegistry::with_defaults()).unwrap();
        schema
    }

    fn change(schema: &Schema, path: &str, next: Value) -> SettingsChange {
        SettingsChange {
            previous: Value::Null,
            next,
            entry: Arc::clone(schema.entry(path).unwrap()),
        }
    }

    async fn provider(schema: &Schema) -> SqliteProvider {
        let provider = SqliteProvider::new(connect_in_memory().await.unwrap());
        provider.create_table("guilds").await.unwrap();
        for entry in schema.leaves() {
            provider.add_column("guilds", entry).await.unwrap();
        }
        provider
    }

    #[tokio::test]
    async fn test_table_and_columns() {
        let schema = schema();
        let provider = SqliteProvider::new(connect_in_memory().await.unwrap());
        assert!(!provider.has_table("guilds").await.unwrap());

        provider.create_table("guilds").await.unwrap();
        provider.create_table("guilds").await.unwrap();
        assert!(provider.has_table("guilds").await.unwrap());
        assert!(provider.get_columns("guilds").await.unwrap().is_empty());

        provider
            .add_column("guilds", schema.entry("roles.admin").unwrap())
            .await
            .unwrap();
        assert_eq!(provider.get_columns("guilds").await.unwrap(), vec!["roles.admin"]);
    }

    #[tokio::test]
    async fn test_create_get_nested_row() {
        let schema = schema();
        let provider = provider(&schema).await;

        provider
            .create(
                "guilds",
                "1",
                &[
                    change(&schema, "roles.admin", json!("42")),
                    change(&schema, "disabled", json!(["ping", "help"])),
                ],
            )
            .await
            .unwrap();

        let row = provider.get("guilds", "1").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(row),
            json!({ "id": "1", "roles": { "admin": "42" }, "disabled": ["ping", "help"] })
        );
        assert!(provider.get("guilds", "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_create_upserts() {
        let schema = schema();
        let provider = provider(&schema).await;
        provider
            .create("guilds", "1", &[change(&schema, "prefix", json!("?"))])
            .await
            .unwrap();
        provider
            .create("guilds", "1", &[change(&schema, "roles.admin", json!("42"))])
            .await
            .unwrap();
        provider.create("guilds", "1", &[]).await.unwrap();

        let row = provider.get("guilds", "1").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(row),
            json!({ "id": "1", "prefix": "?", "roles": { "admin": "42" } })
        );
    }

    #[tokio::test]
    async fn test_update_and_null_columns() {
        let schema = schema();
        let provider = provider(&schema).await;
        provider
            .create("guilds", "1", &[change(&schema, "prefix", json!("?"))])
            .await
            .unwrap();

        provider
            .update("guilds", "1", &[change(&schema, "prefix", Value::Null)])
            .await
            .unwrap();
        let row = provider.get("guilds", "1").await.unwrap().unwrap();
        assert_eq!(Value::Object(row), json!({ "id": "1" }));

        let err = provider
            .update("guilds", "9", &[change(&schema, "prefix", json!("!"))])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
        assert!(matches!(
            provider.update("guilds", "9", &[]).await,
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_all_and_delete() {
        let schema = schema();
        let provider = provider(&schema).await;
        for id in ["3", "1", "2"] {
            provider
                .create("guilds", id, &[change(&schema, "prefix", json!(id))])
                .await
                .unwrap();
        }

        let all = provider.get_all("guilds", None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|row| row["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let wanted = vec!["3".to_string(), "7".to_string()];
        let some = provider.get_all("guilds", Some(&wanted)).await.unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0]["prefix"], json!("3"));
        assert!(provider.get_all("guilds", Some(&[])).await.unwrap().is_empty());

        provider.delete("guilds", "3").await.unwrap();
        provider.delete("guilds", "3").await.unwrap();
        assert_eq!(provider.get_all("guilds", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let provider = SqliteProvider::new(connect_in_memory().await.unwrap());
        let err = provider.get("nope", "1").await.unwrap_err();
        assert_eq!(err, ProviderError::TableMissing("nope".to_string()));
    }

    #[test]
    fn test_quote_doubles_quotes() {
        assert_eq!(quote("roles.admin"), "\"roles.admin\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
