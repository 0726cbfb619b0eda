//! Typed, schema-driven settings store.
//!
//! `gatehouse-core` holds the domain of gatehouse: schemas and their
//! entries, value serializers, per-entity settings documents, gateways with
//! their request-coalescing read path, the gateway driver, and the port
//! traits that storage adapters implement. Concrete database adapters live
//! in `gatehouse-db`.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::{
//!     DriverConfig, EntryOptions, GatewayDriver, MemoryProvider, ProviderRegistry, Schema,
//!     SerializerRegistry, UpdateOptions,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut providers = ProviderRegistry::new();
//! providers.register("memory", Arc::new(MemoryProvider::new()));
//!
//! let mut schema = Schema::new();
//! schema.add("prefix", "string", EntryOptions::new().default_value("!"))?;
//!
//! let mut driver = GatewayDriver::new(
//!     SerializerRegistry::with_defaults(),
//!     providers,
//!     DriverConfig::default(),
//! );
//! driver.register("guilds", schema)?;
//! driver.init().await?;
//!
//! let guilds = driver.gateway("guilds")?;
//! let settings = guilds.acquire("1234");
//! settings.update(("prefix", "?"), UpdateOptions::new()).await?;
//! assert_eq!(settings.get("prefix"), Some(json!("?")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod ports;
pub mod schema;
pub mod serializer;
pub mod settings;

// Re-export commonly used types for convenience
pub use config::{DEFAULT_PROVIDER, DriverConfig, GatewayConfig, PROVIDER_ENV};
pub use events::SettingsEvent;
pub use gateway::{
    BatchFetcher, Gateway, GatewayDeps, GatewayDriver, GatewayError, ProviderFetcher,
    RequestHandler,
};
pub use memory::MemoryProvider;
pub use ports::{
    BroadcastEmitter, NoopEmitter, Provider, ProviderError, ProviderKind, ProviderRegistry, Row,
    SettingsEventEmitter, apply_changes,
};
pub use schema::{EntryFilter, EntryOptions, Schema, SchemaEntry, SchemaError, SchemaNode};
pub use serializer::{
    Serializer, SerializerContext, SerializerError, SerializerRegistry, check_bounds,
};
pub use settings::{
    ArrayAction, ExistenceStatus, ParseArrayActionError, ResetOptions, Settings, SettingsChange,
    SettingsError, SettingsUpdateResult, UpdateInput, UpdateOptions,
};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
