//! Settings schema: an ordered tree of entries and folders.
//!
//! A schema is built by bootstrap code with [`Schema::add`] and
//! [`Schema::add_folder`], then frozen by the gateway that owns it. Freezing
//! binds every entry to its serializer, validates bounds and defaults, and
//! computes the defaults document that seeds new settings documents.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::schema::{EntryOptions, Schema};
//! use gatehouse_core::serializer::SerializerRegistry;
//!
//! let mut schema = Schema::new();
//! schema
//!     .add("prefix", "string", EntryOptions::new().default_value("!"))?
//!     .add_folder("roles", |roles| {
//!         roles.add("admin", "string", EntryOptions::new())?;
//!         Ok(())
//!     })?;
//!
//! schema.freeze(&SerializerRegistry::with_defaults())?;
//! assert!(schema.entry("roles.admin").is_some());
//! # Ok::<(), gatehouse_core::schema::SchemaError>(())
//! ```

mod entry;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::serializer::SerializerRegistry;

pub use entry::{EntryFilter, EntryOptions, SchemaEntry};

/// Errors raised while defining or freezing a schema.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Schema keys cannot be empty")]
    EmptyKey,

    #[error("Invalid schema key '{0}': keys cannot contain '.'")]
    InvalidKey(String),

    #[error("Key '{path}' is already a {existing} and cannot be redefined as a {requested}")]
    KindConflict {
        path: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("Schema is frozen, cannot modify '{0}'")]
    Frozen(String),

    #[error("Schema validation failed: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

/// A node of the schema tree.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Entry(Arc<SchemaEntry>),
    Folder(Schema),
}

impl SchemaNode {
    pub const fn as_entry(&self) -> Option<&Arc<SchemaEntry>> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Folder(_) => None,
        }
    }

    pub const fn as_folder(&self) -> Option<&Schema> {
        match self {
            Self::Entry(_) => None,
            Self::Folder(folder) => Some(folder),
        }
    }

    pub const fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }
}

/// Ordered tree of schema entries and nested folders.
///
/// The root schema has an empty path; folders carry their absolute dotted
/// path so entries created inside them get absolute paths too.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    path: String,
    nodes: IndexMap<String, SchemaNode>,
    defaults: Map<String, Value>,
    ready: bool,
}

impl Schema {
    /// Create an empty root schema.
    pub fn new() -> Self {
        Self::default()
    }

    fn folder_at(path: String) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn check_mutable(&self, key: &str) -> Result<(), SchemaError> {
        if self.ready {
            return Err(SchemaError::Frozen(self.child_path(key)));
        }
        if key.is_empty() {
            return Err(SchemaError::EmptyKey);
        }
        if key.contains('.') {
            return Err(SchemaError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Add an entry, or edit it in place if the key already holds one.
    pub fn add(
        &mut self,
        key: &str,
        type_name: &str,
        options: EntryOptions,
    ) -> Result<&mut Self, SchemaError> {
        self.check_mutable(key)?;
        let path = self.child_path(key);

        match self.nodes.get_mut(key) {
            Some(SchemaNode::Folder(_)) => {
                return Err(SchemaError::KindConflict {
                    path,
                    existing: "folder",
                    requested: "entry",
                });
            }
            Some(SchemaNode::Entry(entry)) => Arc::make_mut(entry).edit(type_name, options),
            None => {
                let entry = SchemaEntry::new(key, path, type_name, options);
                self.nodes
                    .insert(key.to_string(), SchemaNode::Entry(Arc::new(entry)));
            }
        }

        Ok(self)
    }

    /// Add a folder, or merge into it if the key already holds one.
    pub fn add_folder<F>(&mut self, key: &str, build: F) -> Result<&mut Self, SchemaError>
    where
        F: FnOnce(&mut Self) -> Result<(), SchemaError>,
    {
        self.check_mutable(key)?;
        let path = self.child_path(key);

        let node = self
            .nodes
            .entry(key.to_string())
            .or_insert_with(|| SchemaNode::Folder(Self::folder_at(path.clone())));
        match node {
            SchemaNode::Folder(folder) => build(folder)?,
            SchemaNode::Entry(_) => {
                return Err(SchemaError::KindConflict {
                    path,
                    existing: "entry",
                    requested: "folder",
                });
            }
        }

        Ok(self)
    }

    /// Remove a direct child, returning it.
    pub fn remove(&mut self, key: &str) -> Result<Option<SchemaNode>, SchemaError> {
        self.check_mutable(key)?;
        Ok(self.nodes.shift_remove(key))
    }

    /// Resolve a dotted path.
    ///
    /// Returns `None` when a segment is missing or when the path tries to
    /// descend into an entry.
    pub fn get(&self, path: &str) -> Option<&SchemaNode> {
        let mut segments = path.split('.');
        let mut node = self.nodes.get(segments.next()?)?;
        for segment in segments {
            node = node.as_folder()?.nodes.get(segment)?;
        }
        Some(node)
    }

    /// Resolve a dotted path to an entry.
    pub fn entry(&self, path: &str) -> Option<&Arc<SchemaEntry>> {
        self.get(path).and_then(SchemaNode::as_entry)
    }

    /// Resolve a dotted path to a folder.
    pub fn folder(&self, path: &str) -> Option<&Self> {
        self.get(path).and_then(SchemaNode::as_folder)
    }

    /// Absolute path of this folder (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.nodes.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Keys of this schema.
    ///
    /// In recursive mode folders are flattened and the absolute paths of
    /// every entry are returned instead.
    pub fn keys(&self, recursive: bool) -> Vec<String> {
        self.entries(recursive).into_iter().map(|(key, _)| key).collect()
    }

    /// Nodes of this schema; recursive mode yields entries only.
    pub fn values(&self, recursive: bool) -> Vec<&SchemaNode> {
        self.entries(recursive).into_iter().map(|(_, node)| node).collect()
    }

    /// Key/node pairs; recursive mode yields `(path, entry)` pairs only.
    pub fn entries(&self, recursive: bool) -> Vec<(String, &SchemaNode)> {
        if !recursive {
            return self
                .nodes
                .iter()
                .map(|(key, node)| (key.clone(), node))
                .collect();
        }

        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries<'a>(&'a self, out: &mut Vec<(String, &'a SchemaNode)>) {
        for node in self.nodes.values() {
            match node {
                SchemaNode::Entry(entry) => out.push((entry.path().to_string(), node)),
                SchemaNode::Folder(folder) => folder.collect_entries(out),
            }
        }
    }

    /// Every entry in the tree, depth-first in declaration order.
    pub fn leaves(&self) -> Vec<&Arc<SchemaEntry>> {
        self.values(true)
            .into_iter()
            .filter_map(SchemaNode::as_entry)
            .collect()
    }

    /// Validate every entry, bind serializers and make the schema read-only.
    ///
    /// All problems are gathered before failing so a broken schema is
    /// reported in one go. Freezing an already frozen schema is a no-op.
    pub fn freeze(&mut self, registry: &SerializerRegistry) -> Result<(), SchemaError> {
        if self.ready {
            return Ok(());
        }

        let mut problems = Vec::new();
        self.bind_entries(registry, &mut problems);
        if !problems.is_empty() {
            return Err(SchemaError::Invalid { problems });
        }

        self.mark_ready();
        Ok(())
    }

    fn bind_entries(&mut self, registry: &SerializerRegistry, problems: &mut Vec<String>) {
        for node in self.nodes.values_mut() {
            match node {
                SchemaNode::Entry(entry) => problems.extend(Arc::make_mut(entry).bind(registry)),
                SchemaNode::Folder(folder) => folder.bind_entries(registry, problems),
            }
        }
    }

    fn mark_ready(&mut self) {
        for node in self.nodes.values_mut() {
            if let SchemaNode::Folder(folder) = node {
                folder.mark_ready();
            }
        }
        self.defaults = self.build_defaults();
        self.ready = true;
    }

    /// The defaults document: a value tree mirroring this schema.
    ///
    /// Always an independent copy.
    pub fn defaults(&self) -> Map<String, Value> {
        if self.ready {
            self.defaults.clone()
        } else {
            self.build_defaults()
        }
    }

    fn build_defaults(&self) -> Map<String, Value> {
        self.nodes
            .iter()
            .map(|(key, node)| {
                let value = match node {
                    SchemaNode::Entry(entry) => entry.default().clone(),
                    SchemaNode::Folder(folder) => Value::Object(folder.build_defaults()),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Schema {
        let mut schema = Schema::new();
        schema
            .add("prefix", "string", EntryOptions::new().default_value("!"))
            .unwrap()
            .add("language", "string", EntryOptions::new().default_value("en-US"))
            .unwrap()
            .add_folder("roles", |roles| {
                roles.add("admin", "string", EntryOptions::new())?;
                roles.add("muted", "string", EntryOptions::new().configurable(false))?;
                Ok(())
            })
            .unwrap()
            .add("disabled", "string", EntryOptions::new().array())
            .unwrap();
        schema
    }

    #[test]
    fn test_get_resolves_nested_paths() {
        let schema = sample();
        assert!(schema.get("roles").unwrap().is_folder());
        assert_eq!(schema.entry("roles.admin").unwrap().path(), "roles.admin");
        assert!(schema.get("roles.missing").is_none());
        assert!(schema.get("prefix.deeper").is_none());
        assert!(schema.get("").is_none());
    }

    #[test]
    fn test_kind_conflicts_are_rejected() {
        let mut schema = sample();
        let err = schema.add("roles", "string", EntryOptions::new()).unwrap_err();
        assert!(matches!(err, SchemaError::KindConflict { existing: "folder", .. }));

        let err = schema.add_folder("prefix", |_| Ok(())).unwrap_err();
        assert!(matches!(err, SchemaError::KindConflict { existing: "entry", .. }));
    }

    #[test]
    fn test_readding_merges_and_edits() {
        let mut schema = sample();
        schema
            .add_folder("roles", |roles| {
                roles.add("moderator", "string", EntryOptions::new())?;
                Ok(())
            })
            .unwrap();
        schema
            .add("prefix", "string", EntryOptions::new().default_value("?"))
            .unwrap();

        assert_eq!(schema.folder("roles").unwrap().len(), 3);
        assert_eq!(schema.entry("prefix").unwrap().default(), &json!("?"));
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn test_invalid_keys() {
        let mut schema = Schema::new();
        assert!(matches!(
            schema.add("", "string", EntryOptions::new()),
            Err(SchemaError::EmptyKey)
        ));
        assert!(matches!(
            schema.add("a.b", "string", EntryOptions::new()),
            Err(SchemaError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_recursive_iteration_flattens_folders() {
        let schema = sample();
        assert_eq!(
            schema.keys(false),
            vec!["prefix", "language", "roles", "disabled"]
        );
        assert_eq!(
            schema.keys(true),
            vec!["prefix", "language", "roles.admin", "roles.muted", "disabled"]
        );
        assert!(schema.values(true).iter().all(|node| !node.is_folder()));
        assert_eq!(schema.leaves().len(), 5);
    }

    #[test]
    fn test_defaults_document_mirrors_shape() {
        let schema = sample();
        assert_eq!(
            Value::Object(schema.defaults()),
            json!({
                "prefix": "!",
                "language": "en-US",
                "roles": { "admin": null, "muted": null },
                "disabled": []
            })
        );
    }

    #[test]
    fn test_freeze_locks_the_schema() {
        let mut schema = sample();
        schema.freeze(&SerializerRegistry::with_defaults()).unwrap();
        assert!(schema.is_ready());
        assert!(schema.folder("roles").unwrap().is_ready());
        assert!(schema.entry("roles.admin").unwrap().serializer().is_some());

        let err = schema.add("extra", "string", EntryOptions::new()).unwrap_err();
        assert!(matches!(err, SchemaError::Frozen(path) if path == "extra"));
    }

    #[test]
    fn test_freeze_aggregates_problems() {
        let mut schema = Schema::new();
        schema
            .add("a", "nonsense", EntryOptions::new())
            .unwrap()
            .add("b", "integer", EntryOptions::new().bounds(5.0, 1.0))
            .unwrap()
            .add_folder("c", |c| {
                c.add("d", "string", EntryOptions::new().array().default_value(1))?;
                Ok(())
            })
            .unwrap();

        let err = schema
            .freeze(&SerializerRegistry::with_defaults())
            .unwrap_err();
        match err {
            SchemaError::Invalid { problems } => {
                assert_eq!(problems.len(), 3);
                assert!(problems.iter().any(|p| p.starts_with("c.d")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!schema.is_ready());
    }
}
