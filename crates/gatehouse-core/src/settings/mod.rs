//! Settings documents: the live, per-entity value trees.
//!
//! A [`Settings`] document mirrors its gateway's schema. It starts out as a
//! copy of the schema defaults in the `Unsynchronized` state, is lazily
//! synchronized with the provider through the gateway's request handler,
//! and is only ever mutated after a provider write succeeded.
//!
//! Documents are created by [`Gateway::acquire`](crate::gateway::Gateway::acquire)
//! and shared as `Arc<Settings>`.

mod change;
mod error;
pub mod tree;
mod update;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::SettingsEvent;
use crate::gateway::GatewayContext;
use crate::ports::Row;
use crate::schema::{Schema, SchemaEntry, SchemaNode};
use crate::serializer::{Serializer, SerializerContext, SerializerError};

pub use change::{SettingsChange, SettingsUpdateResult};
pub use error::SettingsError;
pub use update::{ArrayAction, ParseArrayActionError, ResetOptions, UpdateInput, UpdateOptions};

/// Whether a document's row is known to exist in the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceStatus {
    /// Not synchronized yet; values are the schema defaults.
    #[default]
    Unsynchronized,
    /// The provider holds a row for this id.
    Exists,
    /// The provider has no row for this id.
    NotExists,
}

#[derive(Debug)]
struct DocumentState {
    status: ExistenceStatus,
    values: Map<String, Value>,
    /// Bumped by every write and destroy; stale reads compare against it.
    generation: u64,
}

/// Settings document of one entity.
pub struct Settings {
    id: String,
    gateway: Arc<GatewayContext>,
    state: RwLock<DocumentState>,
}

impl Settings {
    pub(crate) fn new(id: impl Into<String>, gateway: Arc<GatewayContext>) -> Self {
        let values = gateway.schema.defaults();
        Self {
            id: id.into(),
            gateway,
            state: RwLock::new(DocumentState {
                status: ExistenceStatus::Unsynchronized,
                values,
                generation: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DocumentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DocumentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the owning entity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the owning gateway.
    pub fn gateway_name(&self) -> &str {
        &self.gateway.name
    }

    /// The frozen schema this document mirrors.
    pub fn schema(&self) -> &Schema {
        &self.gateway.schema
    }

    pub fn status(&self) -> ExistenceStatus {
        self.read().status
    }

    /// Whether the provider holds a row for this document.
    pub fn exists(&self) -> bool {
        self.status() == ExistenceStatus::Exists
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Value at a dotted path, or `None` when a segment is missing.
    ///
    /// The returned value is an independent copy of the cached one.
    pub fn get(&self, path: &str) -> Option<Value> {
        tree::get_path(&self.read().values, path).cloned()
    }

    /// Typed read of a dotted path; `None` if missing or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        serde_json::from_value(self.get(path)?).ok()
    }

    /// Values of several paths at once, in order.
    pub fn pluck(&self, paths: &[&str]) -> Vec<Option<Value>> {
        let state = self.read();
        paths
            .iter()
            .map(|path| tree::get_path(&state.values, path).cloned())
            .collect()
    }

    /// The whole document as a plain nested JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.read().values.clone())
    }

    fn leaf_entry(&self, path: &str) -> Result<&Arc<SchemaEntry>, SettingsError> {
        match self.gateway.schema.get(path) {
            Some(SchemaNode::Entry(entry)) => Ok(entry),
            Some(SchemaNode::Folder(folder)) => Err(SettingsError::ChooseKey {
                path: path.to_string(),
                keys: folder.keys(false),
            }),
            None => Err(SettingsError::KeyNotFound(path.to_string())),
        }
    }

    fn serializer_context<'a>(&'a self, entry: &'a SchemaEntry) -> SerializerContext<'a> {
        SerializerContext::new(entry, &self.gateway.name, &self.id)
    }

    /// Deserialize stored values back into their resolved form.
    ///
    /// Entries declared with `resolve(false)` are returned as stored. Array
    /// values are resolved element by element.
    pub async fn resolve(&self, paths: &[&str]) -> Result<Vec<Value>, SettingsError> {
        let entries = paths
            .iter()
            .map(|path| self.leaf_entry(path))
            .collect::<Result<Vec<_>, _>>()?;

        try_join_all(entries.into_iter().map(|entry| self.resolve_entry(entry))).await
    }

    async fn resolve_entry(&self, entry: &Arc<SchemaEntry>) -> Result<Value, SettingsError> {
        let stored = self.get(entry.path()).unwrap_or(Value::Null);
        let serializer = match entry.serializer() {
            Some(serializer) if entry.should_resolve() && !stored.is_null() => serializer,
            _ => return Ok(stored),
        };

        let ctx = self.serializer_context(entry);
        match stored {
            Value::Array(items) if entry.is_array() => {
                let resolved =
                    try_join_all(items.iter().map(|item| serializer.deserialize(item, &ctx)))
                        .await?;
                Ok(Value::Array(resolved))
            }
            other => Ok(serializer.deserialize(&other, &ctx).await?),
        }
    }

    /// Human-readable rendering of the value at `path`.
    ///
    /// Array values are rendered element by element and joined with
    /// `", "`; an empty array renders as `"None"`.
    pub fn display(&self, path: &str) -> Result<String, SettingsError> {
        let entry = self.leaf_entry(path)?;
        let value = self.get(path).unwrap_or(Value::Null);
        let serializer = bound_serializer(entry)?;
        let ctx = self.serializer_context(entry);

        Ok(match value {
            Value::Array(items) if entry.is_array() => {
                if items.is_empty() {
                    "None".to_string()
                } else {
                    items
                        .iter()
                        .map(|item| serializer.stringify(item, &ctx))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            }
            other => serializer.stringify(&other, &ctx),
        })
    }

    // ========================================================================
    // Provider synchronization
    // ========================================================================

    /// Synchronize with the provider.
    ///
    /// Returns immediately unless the document is unsynchronized or `force`
    /// is set. Concurrent syncs of the same id share one provider read. A
    /// result is only applied if no write landed while it was in flight.
    pub async fn sync(&self, force: bool) -> Result<&Self, SettingsError> {
        let generation = {
            let state = self.read();
            if !force && state.status != ExistenceStatus::Unsynchronized {
                return Ok(self);
            }
            state.generation
        };

        let row = self.gateway.handler.push(&self.id).await?;
        let exists = row.is_some();

        {
            let mut state = self.write();
            if state.generation != generation
                || (!force && state.status != ExistenceStatus::Unsynchronized)
            {
                tracing::debug!(
                    gateway = %self.gateway.name,
                    id = %self.id,
                    "Discarding settings read overtaken by a write"
                );
                return Ok(self);
            }
            state.values = self.values_from_row(row.as_ref());
            state.status = if exists {
                ExistenceStatus::Exists
            } else {
                ExistenceStatus::NotExists
            };
        }

        tracing::debug!(gateway = %self.gateway.name, id = %self.id, exists, "Settings synchronized");
        self.gateway.emitter.emit(SettingsEvent::Synced {
            gateway: self.gateway.name.clone(),
            id: self.id.clone(),
            exists,
        });
        Ok(self)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Apply a row fetched outside the request handler (bulk sync), unless
    /// the document was written since `generation` was observed.
    pub(crate) fn apply_row(&self, row: &Row, generation: u64) -> bool {
        let mut state = self.write();
        if state.generation != generation {
            return false;
        }
        state.values = self.values_from_row(Some(row));
        state.status = ExistenceStatus::Exists;
        true
    }

    /// Defaults patched with every known, non-null schema path of `row`.
    fn values_from_row(&self, row: Option<&Row>) -> Map<String, Value> {
        let mut values = self.gateway.schema.defaults();
        if let Some(row) = row {
            for entry in self.gateway.schema.leaves() {
                if let Some(value) = tree::get_path(row, entry.path()).filter(|v| !v.is_null()) {
                    tree::set_path(&mut values, entry.path(), value.clone());
                }
            }
        }
        values
    }

    /// Delete the provider row and reset the document to defaults.
    pub async fn destroy(&self) -> Result<&Self, SettingsError> {
        self.sync(false).await?;

        if self.exists() {
            let provider = self.gateway.provider()?;
            provider.delete(&self.gateway.name, &self.id).await?;
        }

        {
            let mut state = self.write();
            state.values = self.gateway.schema.defaults();
            state.status = ExistenceStatus::NotExists;
            state.generation += 1;
        }

        tracing::debug!(gateway = %self.gateway.name, id = %self.id, "Settings destroyed");
        self.gateway.emitter.emit(SettingsEvent::Deleted {
            gateway: self.gateway.name.clone(),
            id: self.id.clone(),
        });
        Ok(self)
    }

    /// Write `changes` through the provider, then patch the cached tree.
    async fn persist(&self, changes: &[SettingsChange]) -> Result<(), SettingsError> {
        let provider = self.gateway.provider()?;
        let table = self.gateway.name.as_str();
        let created = self.status() == ExistenceStatus::NotExists;

        if created {
            provider.create(table, &self.id, changes).await?;
        } else {
            provider.update(table, &self.id, changes).await?;
        }

        {
            let mut state = self.write();
            for change in changes {
                tree::set_path(&mut state.values, change.path(), change.next.clone());
            }
            state.status = ExistenceStatus::Exists;
            state.generation += 1;
        }

        tracing::debug!(
            gateway = %table,
            id = %self.id,
            changes = changes.len(),
            created,
            "Settings persisted"
        );

        let (gateway, id, changes) = (table.to_string(), self.id.clone(), changes.to_vec());
        self.gateway.emitter.emit(if created {
            SettingsEvent::Created { gateway, id, changes }
        } else {
            SettingsEvent::Updated { gateway, id, changes }
        });
        Ok(())
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Settings")
            .field("gateway", &self.gateway.name)
            .field("id", &self.id)
            .field("status", &state.status)
            .field("values", &state.values)
            .finish()
    }
}

/// The serializer cached on a frozen entry.
fn bound_serializer(entry: &SchemaEntry) -> Result<&Arc<dyn Serializer>, SettingsError> {
    entry.serializer().ok_or_else(|| {
        SettingsError::Resolution(SerializerError::Unresolvable {
            key: entry.path().to_string(),
            message: format!("type '{}' is not bound to a serializer", entry.type_name()),
        })
    })
}
