//! `update` and `reset`: validate, diff, persist, patch.
//!
//! Both operations follow the same pipeline. Target paths are resolved
//! against the schema, raw values are validated concurrently, the document
//! is synchronized, the next value of every touched key is planned against
//! a working copy, unchanged keys are dropped, and the remaining changes
//! are written through the provider in a single call before the cached
//! tree is patched.

use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    ExistenceStatus, Settings, SettingsChange, SettingsError, SettingsUpdateResult,
    bound_serializer,
};
use crate::schema::{Schema, SchemaEntry, SchemaNode};
use crate::serializer::{SerializerContext, SerializerError};

// ============================================================================
// Options
// ============================================================================

/// Merge policy for array-valued keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayAction {
    /// Remove values that are present, append the others.
    #[default]
    Auto,
    /// Append; values already present are rejected.
    Add,
    /// Remove; values not present are rejected.
    Remove,
    /// Replace the whole array.
    Overwrite,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown array action '{0}', expected auto, add, remove or overwrite")]
pub struct ParseArrayActionError(String);

impl FromStr for ArrayAction {
    type Err = ParseArrayActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(ParseArrayActionError(s.to_string())),
        }
    }
}

/// Options for [`Settings::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub array_action: ArrayAction,
    /// Splice position for array keys; see [`ArrayAction`] for how each
    /// action uses it.
    pub array_index: Option<usize>,
    /// Return the first error instead of collecting it; nothing is written.
    pub fail_fast: bool,
    /// Reject keys that are not user-configurable.
    pub only_configurable: bool,
    /// Caller context handed to serializers (the owning guild, ...).
    pub context: Option<Value>,
    pub extra_context: Option<Value>,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn action(mut self, action: ArrayAction) -> Self {
        self.array_action = action;
        self
    }

    #[must_use]
    pub const fn index(mut self, index: usize) -> Self {
        self.array_index = Some(index);
        self
    }

    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub const fn only_configurable(mut self, only_configurable: bool) -> Self {
        self.only_configurable = only_configurable;
        self
    }

    #[must_use]
    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn extra_context(mut self, extra_context: Value) -> Self {
        self.extra_context = Some(extra_context);
        self
    }
}

/// Options for [`Settings::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// Skip keys that are not user-configurable.
    pub only_configurable: bool,
    pub fail_fast: bool,
}

impl ResetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn only_configurable(mut self, only_configurable: bool) -> Self {
        self.only_configurable = only_configurable;
        self
    }

    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

// ============================================================================
// Input
// ============================================================================

/// What to update: path/value pairs or a (nested) object.
///
/// Objects are flattened against the schema: an object under a folder key
/// descends into the folder, anything else is a value for that path.
#[derive(Debug, Clone)]
pub enum UpdateInput {
    Pairs(Vec<(String, Value)>),
    Object(Map<String, Value>),
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for UpdateInput {
    fn from((path, value): (K, V)) -> Self {
        Self::Pairs(vec![(path.into(), value.into())])
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for UpdateInput {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(path, value)| (path.into(), value.into()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for UpdateInput {
    fn from(object: Map<String, Value>) -> Self {
        Self::Object(object)
    }
}

impl UpdateInput {
    fn into_pairs(self, schema: &Schema) -> Vec<(String, Value)> {
        match self {
            Self::Pairs(pairs) => pairs,
            Self::Object(object) => {
                let mut pairs = Vec::new();
                flatten_into(schema, None, object, &mut pairs);
                pairs
            }
        }
    }
}

fn flatten_into(
    schema: &Schema,
    prefix: Option<&str>,
    object: Map<String, Value>,
    out: &mut Vec<(String, Value)>,
) {
    for (key, value) in object {
        let path = prefix.map_or_else(|| key.clone(), |prefix| format!("{prefix}.{key}"));
        match (schema.get(&path), value) {
            (Some(SchemaNode::Folder(_)), Value::Object(inner)) => {
                flatten_into(schema, Some(&path), inner, out);
            }
            (_, value) => out.push((path, value)),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

struct Target {
    entry: Arc<SchemaEntry>,
    raw: Value,
}

enum Parsed {
    /// Reset the key to its default.
    Default,
    One(Value),
    Many(Vec<Value>),
}

/// Accumulates errors, honouring `fail_fast`.
struct Errors {
    fail_fast: bool,
    errors: Vec<SettingsError>,
}

impl Errors {
    const fn new(fail_fast: bool) -> Self {
        Self {
            fail_fast,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, error: SettingsError) {
        self.errors.push(error);
    }

    /// In fail-fast mode, surface the first collected error.
    fn check(&mut self) -> Result<(), SettingsError> {
        if self.fail_fast && !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0));
        }
        Ok(())
    }
}

impl Settings {
    /// Validate and persist new values.
    ///
    /// A `null` value resets its key to the default. Per-key failures are
    /// collected into the result unless `fail_fast` is set; provider
    /// failures always abort and leave the document untouched. When no
    /// path resolves to a schema entry the provider is never called.
    pub async fn update(
        &self,
        input: impl Into<UpdateInput>,
        options: UpdateOptions,
    ) -> Result<SettingsUpdateResult, SettingsError> {
        let pairs = input.into().into_pairs(&self.gateway.schema);
        let mut errors = Errors::new(options.fail_fast);

        let mut targets = Vec::with_capacity(pairs.len());
        for (path, raw) in pairs {
            match self.leaf_entry(&path) {
                Ok(entry) if options.only_configurable && !entry.is_configurable() => {
                    errors.push(SettingsError::NotConfigurable(path));
                }
                Ok(entry) => targets.push(Target {
                    entry: Arc::clone(entry),
                    raw,
                }),
                Err(error) => errors.push(error),
            }
        }
        errors.check()?;

        let parsed = join_all(targets.iter().map(|target| self.parse(target, &options))).await;
        let mut accepted = Vec::with_capacity(parsed.len());
        for (target, parsed) in targets.into_iter().zip(parsed) {
            match parsed {
                Ok(parsed) => accepted.push((target.entry, parsed)),
                Err(error) => errors.push(error),
            }
        }
        errors.check()?;

        if accepted.is_empty() {
            return Ok(SettingsUpdateResult {
                updated: Vec::new(),
                errors: errors.errors,
            });
        }

        self.sync(false).await?;

        // path -> (entry, previous, next)
        let mut working: IndexMap<String, (Arc<SchemaEntry>, Value, Value)> = IndexMap::new();
        for (entry, parsed) in accepted {
            let path = entry.path().to_string();
            let slot = working.entry(path).or_insert_with(|| {
                let previous = self.get(entry.path()).unwrap_or(Value::Null);
                (Arc::clone(&entry), previous.clone(), previous)
            });

            slot.2 = match parsed {
                Parsed::Default => entry.default().clone(),
                Parsed::One(value) => value,
                Parsed::Many(values) => plan_array(&entry, &slot.2, values, &options, &mut errors),
            };
        }
        errors.check()?;

        let changes: Vec<SettingsChange> = working
            .into_values()
            .filter(|(_, previous, next)| previous != next)
            .map(|(entry, previous, next)| SettingsChange {
                previous,
                next,
                entry,
            })
            .collect();

        if !changes.is_empty() {
            self.persist(&changes).await?;
        }

        Ok(SettingsUpdateResult {
            updated: changes,
            errors: errors.errors,
        })
    }

    /// Validate, filter and serialize one raw value.
    async fn parse(&self, target: &Target, options: &UpdateOptions) -> Result<Parsed, SettingsError> {
        if target.raw.is_null() {
            return Ok(Parsed::Default);
        }

        let entry = target.entry.as_ref();
        let serializer = bound_serializer(entry)?;
        let ctx = SerializerContext {
            context: options.context.as_ref(),
            extra_context: options.extra_context.as_ref(),
            ..self.serializer_context(entry)
        };

        let inputs: Vec<&Value> = match (&target.raw, entry.is_array()) {
            (Value::Array(items), true) => items.iter().collect(),
            (raw, _) => vec![raw],
        };

        let mut values = Vec::with_capacity(inputs.len());
        for input in inputs {
            let parsed = serializer.validate(input, &ctx).await?;
            entry
                .run_filter(&parsed, &ctx)
                .map_err(|message| SerializerError::invalid(&ctx, message))?;
            values.push(serializer.serialize(&parsed));
        }

        if entry.is_array() {
            Ok(Parsed::Many(values))
        } else {
            Ok(values.pop().map_or(Parsed::Default, Parsed::One))
        }
    }

    /// Reset keys to their schema defaults.
    ///
    /// `None` targets every key. Folders reset all of their descendants.
    /// A document without a provider row has nothing to reset.
    pub async fn reset(
        &self,
        paths: Option<&[&str]>,
        options: ResetOptions,
    ) -> Result<SettingsUpdateResult, SettingsError> {
        let schema = &self.gateway.schema;
        let mut errors = Errors::new(options.fail_fast);
        let mut selected: IndexMap<&str, &Arc<SchemaEntry>> = IndexMap::new();
        let allowed = |entry: &&Arc<SchemaEntry>| !options.only_configurable || entry.is_configurable();

        match paths {
            None => {
                for entry in schema.leaves().into_iter().filter(allowed) {
                    selected.insert(entry.path(), entry);
                }
            }
            Some(paths) => {
                for path in paths {
                    match schema.get(path) {
                        None => errors.push(SettingsError::KeyNotFound((*path).to_string())),
                        Some(SchemaNode::Entry(entry)) => {
                            if allowed(&entry) {
                                selected.insert(entry.path(), entry);
                            } else {
                                errors.push(SettingsError::NotConfigurable((*path).to_string()));
                            }
                        }
                        Some(SchemaNode::Folder(folder)) => {
                            let candidates = folder.leaves();
                            for entry in candidates.iter().copied().filter(allowed) {
                                selected.insert(entry.path(), entry);
                            }
                            if options.only_configurable
                                && !candidates.is_empty()
                                && candidates.iter().all(|entry| !entry.is_configurable())
                            {
                                errors.push(SettingsError::GroupNotConfigurable(
                                    (*path).to_string(),
                                ));
                            }
                        }
                    }
                }
            }
        }
        errors.check()?;

        if selected.is_empty() {
            return Ok(SettingsUpdateResult {
                updated: Vec::new(),
                errors: errors.errors,
            });
        }

        self.sync(false).await?;
        if self.status() == ExistenceStatus::NotExists {
            return Ok(SettingsUpdateResult {
                updated: Vec::new(),
                errors: errors.errors,
            });
        }

        let changes: Vec<SettingsChange> = selected
            .into_values()
            .filter_map(|entry| {
                let previous = self.get(entry.path()).unwrap_or(Value::Null);
                let next = entry.default().clone();
                (previous != next).then(|| SettingsChange {
                    previous,
                    next,
                    entry: Arc::clone(entry),
                })
            })
            .collect();

        if !changes.is_empty() {
            self.persist(&changes).await?;
        }

        Ok(SettingsUpdateResult {
            updated: changes,
            errors: errors.errors,
        })
    }
}

/// Compute the next array value for `entry`.
///
/// Without an index, `Auto` toggles each value, `Add`/`Remove` append or
/// delete one value at a time and `Overwrite` replaces the array.
///
/// With an index `i` (which must not exceed the current length):
/// `Add` inserts the values at `i`, `Auto` replaces as many elements as
/// there are values starting at `i`, `Remove` deletes as many elements as
/// there are values starting at `i`. `Overwrite` ignores the index.
fn plan_array(
    entry: &SchemaEntry,
    current: &Value,
    values: Vec<Value>,
    options: &UpdateOptions,
    errors: &mut Errors,
) -> Value {
    if options.array_action == ArrayAction::Overwrite {
        return Value::Array(values);
    }

    let path = entry.path();
    let mut next = current.as_array().cloned().unwrap_or_default();

    if let Some(index) = options.array_index {
        if index > next.len() {
            errors.push(SettingsError::ArrayIndexOutOfBounds {
                path: path.to_string(),
                index,
                len: next.len(),
            });
            return Value::Array(next);
        }

        let end = (index + values.len()).min(next.len());
        match options.array_action {
            ArrayAction::Add => {
                let mut inserts = Vec::with_capacity(values.len());
                for value in values {
                    if next.contains(&value) || inserts.contains(&value) {
                        errors.push(SettingsError::ArrayDuplicate {
                            path: path.to_string(),
                            value,
                        });
                    } else {
                        inserts.push(value);
                    }
                }
                next.splice(index..index, inserts);
            }
            ArrayAction::Auto => {
                next.splice(index..end, values);
            }
            ArrayAction::Remove => {
                next.drain(index..end);
            }
            ArrayAction::Overwrite => {}
        }
        return Value::Array(next);
    }

    for value in values {
        let position = next.iter().position(|existing| existing == &value);
        match (options.array_action, position) {
            (ArrayAction::Auto | ArrayAction::Remove, Some(position)) => {
                next.remove(position);
            }
            (ArrayAction::Auto | ArrayAction::Add, None) => next.push(value),
            (ArrayAction::Add, Some(_)) => errors.push(SettingsError::ArrayDuplicate {
                path: path.to_string(),
                value,
            }),
            (ArrayAction::Remove, None) => errors.push(SettingsError::ArrayMissing {
                path: path.to_string(),
                value,
            }),
            (ArrayAction::Overwrite, _) => {}
        }
    }
    Value::Array(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntryOptions;
    use serde_json::json;

    fn entry() -> Arc<SchemaEntry> {
        let mut schema = Schema::new();
        schema
            .add("tags", "string", EntryOptions::new().array())
            .unwrap();
        Arc::clone(schema.entry("tags").unwrap())
    }

    fn plan(current: Value, values: Value, options: &UpdateOptions) -> (Value, Vec<SettingsError>) {
        let mut errors = Errors::new(false);
        let values = values.as_array().cloned().unwrap();
        let next = plan_array(&entry(), &current, values, options, &mut errors);
        (next, errors.errors)
    }

    #[test]
    fn test_parse_array_action() {
        assert_eq!("Add".parse::<ArrayAction>().unwrap(), ArrayAction::Add);
        assert_eq!(" overwrite ".parse::<ArrayAction>().unwrap(), ArrayAction::Overwrite);
        assert!("merge".parse::<ArrayAction>().is_err());
    }

    #[test]
    fn test_auto_toggles() {
        let options = UpdateOptions::new();
        let (next, errors) = plan(json!(["a"]), json!(["a", "b"]), &options);
        assert_eq!(next, json!(["b"]));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_add_and_remove_report_per_value() {
        let add = UpdateOptions::new().action(ArrayAction::Add);
        let (next, errors) = plan(json!(["a"]), json!(["a", "b"]), &add);
        assert_eq!(next, json!(["a", "b"]));
        assert!(matches!(&errors[..], [SettingsError::ArrayDuplicate { value, .. }] if value == "a"));

        let remove = UpdateOptions::new().action(ArrayAction::Remove);
        let (next, errors) = plan(json!(["a"]), json!(["a", "z"]), &remove);
        assert_eq!(next, json!([]));
        assert!(matches!(&errors[..], [SettingsError::ArrayMissing { value, .. }] if value == "z"));
    }

    #[test]
    fn test_index_splice_semantics() {
        let current = json!(["a", "b"]);

        let add = UpdateOptions::new().action(ArrayAction::Add).index(1);
        assert_eq!(plan(current.clone(), json!(["c"]), &add).0, json!(["a", "c", "b"]));

        let auto = UpdateOptions::new().index(1);
        assert_eq!(plan(current.clone(), json!(["c"]), &auto).0, json!(["a", "c"]));

        let remove = UpdateOptions::new().action(ArrayAction::Remove).index(0);
        assert_eq!(plan(current.clone(), json!(["x"]), &remove).0, json!(["b"]));

        let append = UpdateOptions::new().action(ArrayAction::Add).index(2);
        assert_eq!(plan(current.clone(), json!(["c"]), &append).0, json!(["a", "b", "c"]));

        let overwrite = UpdateOptions::new().action(ArrayAction::Overwrite).index(9);
        assert_eq!(plan(current, json!(["z"]), &overwrite).0, json!(["z"]));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let options = UpdateOptions::new().index(3);
        let (next, errors) = plan(json!(["a", "b"]), json!(["c"]), &options);
        assert_eq!(next, json!(["a", "b"]));
        assert!(matches!(
            &errors[..],
            [SettingsError::ArrayIndexOutOfBounds { index: 3, len: 2, .. }]
        ));
    }

    #[test]
    fn test_object_input_flattens_against_schema() {
        let mut schema = Schema::new();
        schema
            .add("prefix", "string", EntryOptions::new())
            .unwrap()
            .add("blob", "any", EntryOptions::new())
            .unwrap()
            .add_folder("roles", |roles| {
                roles.add("admin", "string", EntryOptions::new())?;
                Ok(())
            })
            .unwrap();

        let Value::Object(object) = json!({
            "prefix": "?",
            "blob": { "nested": true },
            "roles": { "admin": "1" }
        }) else {
            unreachable!()
        };
        let pairs = UpdateInput::from(object).into_pairs(&schema);
        assert_eq!(
            pairs,
            vec![
                ("prefix".to_string(), json!("?")),
                ("blob".to_string(), json!({ "nested": true })),
                ("roles.admin".to_string(), json!("1")),
            ]
        );
    }
}
