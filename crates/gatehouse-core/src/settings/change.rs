use std::sync::Arc;

use serde_json::Value;

use super::SettingsError;
use crate::schema::SchemaEntry;

/// One changed key: the value before and after an update.
#[derive(Debug, Clone)]
pub struct SettingsChange {
    pub previous: Value,
    pub next: Value,
    pub entry: Arc<SchemaEntry>,
}

impl SettingsChange {
    /// Absolute dotted path of the changed key.
    pub fn path(&self) -> &str {
        self.entry.path()
    }
}

/// Outcome of an `update` or `reset` call.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdateResult {
    /// Changes that were persisted and applied, in request order.
    pub updated: Vec<SettingsChange>,
    /// Per-key failures collected along the way.
    pub errors: Vec<SettingsError>,
}

impl SettingsUpdateResult {
    /// Whether nothing failed.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
    }
}
