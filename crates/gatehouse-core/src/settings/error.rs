//! Errors raised by settings document operations.

use serde_json::Value;
use thiserror::Error;

use crate::ports::ProviderError;
use crate::serializer::SerializerError;

/// Per-key and per-call failures of `update`, `reset` and `sync`.
///
/// Key, resolution and array errors are collected into
/// [`SettingsUpdateResult::errors`](super::SettingsUpdateResult); provider
/// errors always abort the call.
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("The key '{0}' does not exist in the schema")]
    KeyNotFound(String),

    #[error("'{path}' is a group, choose one of: {}", .keys.join(", "))]
    ChooseKey { path: String, keys: Vec<String> },

    #[error("The key '{0}' is not configurable")]
    NotConfigurable(String),

    #[error("The group '{0}' is not configurable")]
    GroupNotConfigurable(String),

    #[error(transparent)]
    Resolution(#[from] SerializerError),

    #[error("'{path}' already contains {value}")]
    ArrayDuplicate { path: String, value: Value },

    #[error("'{path}' does not contain {value}")]
    ArrayMissing { path: String, value: Value },

    #[error("Index {index} is out of bounds for '{path}' (length {len})")]
    ArrayIndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
