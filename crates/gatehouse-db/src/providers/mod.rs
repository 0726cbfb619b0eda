//! Provider implementations backed by real storage.
//!
//! Database and filesystem handles are confined to this module and never
//! appear in the `Provider` trait signatures.

mod json;
mod sqlite;

pub use json::JsonProvider;
pub use sqlite::SqliteProvider;
