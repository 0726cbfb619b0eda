//! Schema entries: the leaf descriptors of a settings schema.
//!
//! An entry describes one configuration key: its value type (by serializer
//! name), whether it holds an array, its default, numeric bounds and the
//! optional filter applied after validation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::serializer::{Serializer, SerializerContext, SerializerRegistry};

/// Extra predicate run after a serializer accepted a value.
///
/// `Ok(true)` rejects the value, `Err(message)` rejects it with a custom
/// message, `Ok(false)` lets it through.
pub type EntryFilter =
    Arc<dyn Fn(&Value, &SerializerContext<'_>) -> Result<bool, String> + Send + Sync>;

/// Options used when adding (or editing) a schema entry.
///
/// Every field is optional so that re-adding an existing key only touches
/// what the caller specified.
#[derive(Clone, Default)]
pub struct EntryOptions {
    array: Option<bool>,
    default: Option<Value>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    inclusive: Option<bool>,
    configurable: Option<bool>,
    filter: Option<EntryFilter>,
    resolve: Option<bool>,
}

impl EntryOptions {
    /// Create empty options (all schema defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the entry as array-valued.
    #[must_use]
    pub const fn array(mut self) -> Self {
        self.array = Some(true);
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the lower bound.
    #[must_use]
    pub const fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    /// Set the upper bound.
    #[must_use]
    pub const fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Set both bounds at once.
    #[must_use]
    pub const fn bounds(self, minimum: f64, maximum: f64) -> Self {
        self.minimum(minimum).maximum(maximum)
    }

    /// Whether the bounds themselves are valid values.
    #[must_use]
    pub const fn inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = Some(inclusive);
        self
    }

    /// Whether end users may change this key.
    #[must_use]
    pub const fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    /// Whether reads through `Settings::resolve` deserialize this key.
    #[must_use]
    pub const fn resolve(mut self, resolve: bool) -> Self {
        self.resolve = Some(resolve);
        self
    }

    /// Attach a filter predicate.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value, &SerializerContext<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

/// Leaf descriptor of one configuration key.
#[derive(Clone)]
pub struct SchemaEntry {
    key: String,
    path: String,
    type_name: String,
    array: bool,
    default: Value,
    minimum: Option<f64>,
    maximum: Option<f64>,
    inclusive: bool,
    configurable: bool,
    filter: Option<EntryFilter>,
    should_resolve: bool,
    serializer: Option<Arc<dyn Serializer>>,
}

impl SchemaEntry {
    pub(crate) fn new(
        key: impl Into<String>,
        path: impl Into<String>,
        type_name: impl Into<String>,
        options: EntryOptions,
    ) -> Self {
        let type_name = type_name.into().to_lowercase();
        let array = options.array.unwrap_or(false);
        let default = options
            .default
            .unwrap_or_else(|| generate_default(&type_name, array));

        Self {
            key: key.into(),
            path: path.into(),
            type_name,
            array,
            default,
            minimum: options.minimum,
            maximum: options.maximum,
            inclusive: options.inclusive.unwrap_or(false),
            configurable: options.configurable.unwrap_or(true),
            filter: options.filter,
            should_resolve: options.resolve.unwrap_or(true),
            serializer: None,
        }
    }

    /// Edit the entry in place with a new type and a set of options.
    ///
    /// The default is regenerated when the type or array flag changes and
    /// no explicit default was given.
    pub(crate) fn edit(&mut self, type_name: &str, options: EntryOptions) {
        let type_name = type_name.to_lowercase();
        let mut shape_changed = false;

        if self.type_name != type_name {
            self.type_name = type_name;
            self.serializer = None;
            shape_changed = true;
        }
        if let Some(array) = options.array {
            shape_changed |= self.array != array;
            self.array = array;
        }

        match options.default {
            Some(default) => self.default = default,
            None if shape_changed => self.default = generate_default(&self.type_name, self.array),
            None => {}
        }

        if options.minimum.is_some() {
            self.minimum = options.minimum;
        }
        if options.maximum.is_some() {
            self.maximum = options.maximum;
        }
        if let Some(inclusive) = options.inclusive {
            self.inclusive = inclusive;
        }
        if let Some(configurable) = options.configurable {
            self.configurable = configurable;
        }
        if options.filter.is_some() {
            self.filter = options.filter;
        }
        if let Some(resolve) = options.resolve {
            self.should_resolve = resolve;
        }
    }

    /// Resolve the serializer and check bounds and default well-formedness.
    ///
    /// Returns one message per problem found; an empty list means the entry
    /// is valid and now has its serializer bound.
    pub(crate) fn bind(&mut self, registry: &SerializerRegistry) -> Vec<String> {
        let mut problems = Vec::new();

        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                problems.push(format!(
                    "{}: minimum ({min}) is greater than maximum ({max})",
                    self.path
                ));
            } else if (min - max).abs() < f64::EPSILON && !self.inclusive {
                problems.push(format!(
                    "{}: exclusive bounds of {min} to {max} admit no value",
                    self.path
                ));
            }
        }
        if self.minimum.is_some_and(f64::is_nan) || self.maximum.is_some_and(f64::is_nan) {
            problems.push(format!("{}: bounds must be numbers", self.path));
        }

        let Some(serializer) = registry.get(&self.type_name) else {
            problems.push(format!("{}: unknown type '{}'", self.path, self.type_name));
            return problems;
        };

        if self.array {
            match &self.default {
                Value::Array(items) => {
                    for item in items.iter().filter(|item| !item.is_null()) {
                        if !serializer.accepts(item) {
                            problems.push(format!(
                                "{}: default element {item} is not a valid {}",
                                self.path, self.type_name
                            ));
                        }
                    }
                }
                other => problems.push(format!(
                    "{}: array entries need an array default, got {other}",
                    self.path
                )),
            }
        } else if !self.default.is_null() && !serializer.accepts(&self.default) {
            problems.push(format!(
                "{}: default {} is not a valid {}",
                self.path, self.default, self.type_name
            ));
        }

        if problems.is_empty() {
            self.serializer = Some(serializer);
        }
        problems
    }

    /// Run the filter, if any, against a validated value.
    pub(crate) fn run_filter(&self, value: &Value, ctx: &SerializerContext<'_>) -> Result<(), String> {
        match &self.filter {
            None => Ok(()),
            Some(filter) => match filter(value, ctx) {
                Ok(false) => Ok(()),
                Ok(true) => Err(format!("{value} is not allowed for '{}'", self.path)),
                Err(message) => Err(message),
            },
        }
    }

    /// Key name relative to the owning folder.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Absolute dotted path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serializer name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this key holds an array of values.
    pub const fn is_array(&self) -> bool {
        self.array
    }

    /// Default value (an array for array entries).
    pub const fn default(&self) -> &Value {
        &self.default
    }

    pub const fn minimum(&self) -> Option<f64> {
        self.minimum
    }

    pub const fn maximum(&self) -> Option<f64> {
        self.maximum
    }

    pub const fn inclusive(&self) -> bool {
        self.inclusive
    }

    pub const fn is_configurable(&self) -> bool {
        self.configurable
    }

    pub const fn should_resolve(&self) -> bool {
        self.should_resolve
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Serializer bound at freeze time. `None` until the schema is frozen.
    pub fn serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializer.as_ref()
    }
}

impl fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("path", &self.path)
            .field("type_name", &self.type_name)
            .field("array", &self.array)
            .field("default", &self.default)
            .field("minimum", &self.minimum)
            .field("maximum", &self.maximum)
            .field("inclusive", &self.inclusive)
            .field("configurable", &self.configurable)
            .field("filter", &self.filter.is_some())
            .field("should_resolve", &self.should_resolve)
            .finish_non_exhaustive()
    }
}

/// Default used when an entry is declared without one.
fn generate_default(type_name: &str, array: bool) -> Value {
    if array {
        Value::Array(Vec::new())
    } else if type_name == "boolean" {
        Value::Bool(false)
    } else {
        Value::Null
    }
}
