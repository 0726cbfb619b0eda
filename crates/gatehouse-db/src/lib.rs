//! Storage adapters for gatehouse.
//!
//! Two [`Provider`](gatehouse_core::Provider) implementations live here:
//!
//! - [`SqliteProvider`]: schema-on-write, one `TEXT` column per entry path
//! - [`JsonProvider`]: schemaless, one JSON file per row
//!
//! [`ProviderFactory`] turns a [`StoreConfig`] into a provider registry or a
//! ready-to-register [`GatewayDriver`](gatehouse_core::GatewayDriver).
#![deny(unsafe_code)]

pub mod config;
pub mod factory;
pub mod providers;
pub mod setup;

// Re-export factory for convenient access
pub use factory::ProviderFactory;

pub use config::{ConfigError, DATA_DIR_ENV, DEFAULT_DATA_DIR, ProviderConfig, StoreConfig};
pub use providers::{JsonProvider, SqliteProvider};

// Re-export setup functions for convenient access
pub use setup::{connect_in_memory, connect_sqlite, init_tracing};
