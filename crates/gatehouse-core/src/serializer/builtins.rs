//! Built-in serializers registered by `SerializerRegistry::with_defaults`.

use async_trait::async_trait;
use serde_json::{Number, Value};
use url::Url;

use super::{Serializer, SerializerContext, SerializerError, check_bounds};

const TRUTHY: &[&str] = &["true", "t", "yes", "y", "on", "enable", "enabled", "1", "+"];
const FALSY: &[&str] = &["false", "f", "no", "n", "off", "disable", "disabled", "0", "-"];

/// Accepts any value unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySerializer;

#[async_trait]
impl Serializer for AnySerializer {
    async fn validate(
        &self,
        value: &Value,
        _ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        Ok(value.clone())
    }
}

/// Booleans, with the usual textual spellings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanSerializer;

#[async_trait]
impl Serializer for BooleanSerializer {
    async fn validate(
        &self,
        value: &Value,
        ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        match value {
            Value::Bool(flag) => Ok(Value::Bool(*flag)),
            Value::String(text) => {
                let text = text.trim().to_lowercase();
                if TRUTHY.contains(&text.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSY.contains(&text.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(SerializerError::invalid(ctx, format!("'{text}' is not a boolean")))
                }
            }
            Value::Number(number) => match number.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err(SerializerError::invalid(ctx, format!("{number} is not a boolean"))),
            },
            other => Err(SerializerError::invalid(ctx, format!("{other} is not a boolean"))),
        }
    }

    fn stringify(&self, value: &Value, _ctx: &SerializerContext<'_>) -> String {
        match value {
            Value::Bool(true) => "Enabled".to_string(),
            Value::Bool(false) => "Disabled".to_string(),
            Value::Null => "Not set".to_string(),
            other => other.to_string(),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        value.is_boolean()
    }
}

/// Text, with length bounds taken from the entry's minimum/maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

#[async_trait]
impl Serializer for StringSerializer {
    async fn validate(
        &self,
        value: &Value,
        ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        let text = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            other => {
                return Err(SerializerError::invalid(ctx, format!("{other} is not a string")));
            }
        };

        #[expect(
            clippy::cast_precision_loss,
            reason = "string lengths are far below f64 precision limits"
        )]
        let length = text.chars().count() as f64;
        check_bounds(length, ctx.entry, " characters")
            .map_err(|message| SerializerError::invalid(ctx, message))?;

        Ok(Value::String(text))
    }

    fn accepts(&self, value: &Value) -> bool {
        value.is_string()
    }
}

/// Which numbers a [`NumberSerializer`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    /// Whole numbers only.
    Integer,
    /// Any number, stored as a float.
    Float,
    /// Any number, stored as given.
    Any,
}

/// Numbers (or numeric strings), with bounds.
#[derive(Debug, Clone, Copy)]
pub struct NumberSerializer {
    kind: NumberKind,
}

impl NumberSerializer {
    pub const fn new(kind: NumberKind) -> Self {
        Self { kind }
    }

    fn parse(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|number| number.is_finite())
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "integers are range-checked against i64 before the cast"
    )]
    fn to_value(&self, number: f64) -> Option<Value> {
        let is_whole = number.fract() == 0.0 && number.abs() < 9.0e15;
        match self.kind {
            NumberKind::Float => Number::from_f64(number).map(Value::Number),
            NumberKind::Integer | NumberKind::Any if is_whole => {
                Some(Value::Number(Number::from(number as i64)))
            }
            NumberKind::Integer => None,
            NumberKind::Any => Number::from_f64(number).map(Value::Number),
        }
    }
}

#[async_trait]
impl Serializer for NumberSerializer {
    async fn validate(
        &self,
        value: &Value,
        ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        let number = Self::parse(value)
            .ok_or_else(|| SerializerError::invalid(ctx, format!("{value} is not a number")))?;
        let parsed = self
            .to_value(number)
            .ok_or_else(|| SerializerError::invalid(ctx, format!("{number} is not an integer")))?;

        check_bounds(number, ctx.entry, "")
            .map_err(|message| SerializerError::invalid(ctx, message))?;

        Ok(parsed)
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self.kind, value) {
            (NumberKind::Integer, Value::Number(number)) => {
                number.is_i64() || number.is_u64()
            }
            (_, Value::Number(_)) => true,
            _ => false,
        }
    }
}

/// Absolute URLs; a bare host gets an `https://` scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlSerializer;

#[async_trait]
impl Serializer for UrlSerializer {
    async fn validate(
        &self,
        value: &Value,
        ctx: &SerializerContext<'_>,
    ) -> Result<Value, SerializerError> {
        let Value::String(text) = value else {
            return Err(SerializerError::invalid(ctx, format!("{value} is not a URL")));
        };
        let text = text.trim();

        let parsed = Url::parse(text)
            .or_else(|_| Url::parse(&format!("https://{text}")))
            .ok()
            .filter(|url| url.has_host())
            .ok_or_else(|| SerializerError::invalid(ctx, format!("'{text}' is not a URL")))?;

        let serialized = parsed.to_string();
        #[expect(
            clippy::cast_precision_loss,
            reason = "URL lengths are far below f64 precision limits"
        )]
        let length = serialized.chars().count() as f64;
        check_bounds(length, ctx.entry, " characters")
            .map_err(|message| SerializerError::invalid(ctx, message))?;

        Ok(Value::String(serialized))
    }

    fn accepts(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|text| Url::parse(text).is_ok())
    }
}
