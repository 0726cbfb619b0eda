//! Pluggable value serializers.
//!
//! A serializer is the strategy object behind a schema entry's type name.
//! It validates user input into a parsed value, turns the parsed value into
//! its storage form, resolves stored values back into rich values and
//! renders values for display.
//!
//! Serializers live in a [`SerializerRegistry`] that is handed to the
//! gateway driver at construction. Schemas look their serializers up once,
//! when they are frozen, and cache them on each entry.

mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::schema::SchemaEntry;

pub use builtins::{
    AnySerializer, BooleanSerializer, NumberKind, NumberSerializer, StringSerializer,
    UrlSerializer,
};

/// Errors produced by serializers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializerError {
    /// User input was rejected.
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    /// A stored value could not be resolved back into a rich value.
    #[error("Could not resolve '{key}': {message}")]
    Unresolvable { key: String, message: String },
}

impl SerializerError {
    /// Build an `Invalid` error for the entry in `ctx`.
    pub fn invalid(ctx: &SerializerContext<'_>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: ctx.entry.path().to_string(),
            message: message.into(),
        }
    }

    /// Build an `Unresolvable` error for the entry in `ctx`.
    pub fn unresolvable(ctx: &SerializerContext<'_>, message: impl Into<String>) -> Self {
        Self::Unresolvable {
            key: ctx.entry.path().to_string(),
            message: message.into(),
        }
    }
}

/// Everything a serializer may need to know about the value it handles.
#[derive(Debug, Clone, Copy)]
pub struct SerializerContext<'a> {
    /// The entry being validated or resolved.
    pub entry: &'a SchemaEntry,
    /// Name of the gateway owning the document.
    pub gateway: &'a str,
    /// Id of the entity owning the document.
    pub entity_id: &'a str,
    /// Caller-supplied context (the owning guild, organization, ...).
    pub context: Option<&'a Value>,
    /// Free-form extra context passed through from the caller.
    pub extra_context: Option<&'a Value>,
}

impl<'a> SerializerContext<'a> {
    /// Create a context with no caller-supplied extras.
    pub const fn new(entry: &'a SchemaEntry, gateway: &'a str, entity_id: &'a str) -> Self {
        Self {
            entry,
            gateway,
            entity_id,
            context: None,
            extra_context: None,
        }
    }
}

/// Strategy for one value type.
///
/// `validate` and `deserialize` are async because they may perform I/O,
/// e.g. checking that a referenced remote object exists.
#[async_trait]
pub trait Serializer: Send + Sync {
    /// Parse raw user input into a value of this type.
    async fn validate(
        &self,
        value: &Value,
        ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError>;

    /// Turn a validated value into its storage form.
    fn serialize(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Turn a stored value back into a resolved value.
    async fn deserialize(
        &self,
        stored: &Value,
        _ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        Ok(stored.clone())
    }

    /// Render a stored value for display.
    fn stringify(&self, value: &Value, _ctx: &SerializerContext<'_>) -> String {
        match value {
            Value::Null => "Not set".to_string(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Whether `value` is a well-formed storage value for this type.
    ///
    /// Used to check schema defaults when a schema is frozen.
    fn accepts(&self, _value: &Value) -> bool {
        true
    }
}

/// Registry of serializers keyed by type name.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in serializers.
    ///
    /// Registered names: `any`, `boolean`, `string`, `integer`, `float`,
    /// `number`, `url`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("any", Arc::new(AnySerializer))
            .register("boolean", Arc::new(BooleanSerializer))
            .register("string", Arc::new(StringSerializer))
            .register("integer", Arc::new(NumberSerializer::new(NumberKind::Integer)))
            .register("float", Arc::new(NumberSerializer::new(NumberKind::Float)))
            .register("number", Arc::new(NumberSerializer::new(NumberKind::Any)))
            .register("url", Arc::new(UrlSerializer));
        registry
    }

    /// Register (or replace) a serializer under `name`.
    pub fn register(&mut self, name: &str, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializers.insert(name.to_lowercase(), serializer);
        self
    }

    /// Make `alias` resolve to the serializer registered as `target`.
    ///
    /// Returns `false` if `target` is unknown.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        match self.get(target) {
            Some(serializer) => {
                self.serializers.insert(alias.to_lowercase(), serializer);
                true
            }
            None => false,
        }
    }

    /// Look a serializer up by type name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Serializer>> {
        self.serializers.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.serializers.contains_key(&name.to_lowercase())
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.serializers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Check `value` against the entry's minimum/maximum.
///
/// `suffix` describes the unit in error messages (e.g. `" characters"`).
pub fn check_bounds(value: f64, entry: &SchemaEntry, suffix: &str) -> Result<(), String> {
    let inclusive = entry.inclusive();
    let above = |min: f64| if inclusive { value >= min } else { value > min };
    let below = |max: f64| if inclusive { value <= max } else { value < max };
    let mode = if inclusive { "inclusive" } else { "exclusive" };

    match (entry.minimum(), entry.maximum()) {
        (Some(min), Some(max)) => {
            if above(min) && below(max) {
                Ok(())
            } else if (min - max).abs() < f64::EPSILON {
                Err(format!("must be exactly {min}{suffix}"))
            } else {
                Err(format!("must be between {min} and {max}{suffix} ({mode})"))
            }
        }
        (Some(min), None) if !above(min) => Err(if inclusive {
            format!("must be at least {min}{suffix}")
        } else {
            format!("must be greater than {min}{suffix}")
        }),
        (None, Some(max)) if !below(max) => Err(if inclusive {
            format!("must be at most {max}{suffix}")
        } else {
            format!("must be less than {max}{suffix}")
        }),
        _ => Ok(()),
    }
}
