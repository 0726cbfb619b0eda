//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the settings core expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No `sqlx` or filesystem types in any signature
//! - Providers receive the full change list of one update in a single call
//! - Errors are `Clone` so coalesced readers can share one failure

pub mod event_emitter;
pub mod provider;

use thiserror::Error;

pub use event_emitter::{BroadcastEmitter, NoopEmitter, SettingsEventEmitter};
pub use provider::{Provider, ProviderKind, ProviderRegistry, Row, apply_changes};

/// Domain-specific errors for provider operations.
///
/// This error type abstracts away storage implementation details (e.g.
/// sqlx or I/O errors) and gives the core a clean interface for handling
/// storage failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider is registered under the requested name.
    #[error("Provider not registered: {0}")]
    Unregistered(String),

    /// The table (or collection) does not exist.
    #[error("Table not found: {0}")]
    TableMissing(String),

    /// The requested row was not found.
    #[error("Not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// The id cannot be used as a storage key.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
