//! Common test utilities.
//!
//! A counting provider wrapping the in-memory provider, the schema used
//! across the suites, and a helper that wires a gateway together.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{
    EntryOptions, Gateway, GatewayDeps, MemoryProvider, NoopEmitter, Provider, ProviderError,
    ProviderKind, ProviderRegistry, Row, Schema, SchemaEntry, SerializerRegistry,
    SettingsChange,
};

pub const PROVIDER: &str = "counting";
pub const TABLE: &str = "guilds";

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub get: AtomicUsize,
    pub get_all: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
    pub add_column: AtomicUsize,
}

impl Calls {
    pub fn reads(&self) -> usize {
        self.get.load(Ordering::SeqCst) + self.get_all.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.create.load(Ordering::SeqCst)
            + self.update.load(Ordering::SeqCst)
            + self.delete.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.reads() + self.writes()
    }
}

/// Memory-backed provider that counts calls, can be told to fail writes,
/// and can hold batched reads back after taking their snapshot.
#[derive(Debug)]
pub struct CountingProvider {
    inner: MemoryProvider,
    kind: ProviderKind,
    pub calls: Calls,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub columns: Mutex<HashMap<String, Vec<String>>>,
    pub fail_writes: AtomicBool,
    pub read_delay_ms: AtomicU64,
}

impl CountingProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            inner: MemoryProvider::new(),
            kind,
            calls: Calls::default(),
            batches: Mutex::new(Vec::new()),
            columns: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
        }
    }

    /// Store a raw row without counting it as a write.
    pub async fn seed(&self, table: &str, row: Row) {
        self.inner.insert_row(table, row).await.unwrap();
    }

    fn check_writable(&self) -> Result<(), ProviderError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProviderError::Storage("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn has_table(&self, table: &str) -> Result<bool, ProviderError> {
        self.inner.has_table(table).await
    }

    async fn create_table(&self, table: &str) -> Result<(), ProviderError> {
        self.inner.create_table(table).await
    }

    async fn add_column(&self, table: &str, entry: &SchemaEntry) -> Result<(), ProviderError> {
        self.calls.add_column.fetch_add(1, Ordering::SeqCst);
        self.columns
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(entry.path().to_string());
        Ok(())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .columns
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>, ProviderError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.inner.get(table, id).await
    }

    async fn get_all(
        &self,
        table: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<Row>, ProviderError> {
        self.calls.get_all.fetch_add(1, Ordering::SeqCst);
        if let Some(ids) = ids {
            self.batches.lock().unwrap().push(ids.to_vec());
        }
        let rows = self.inner.get_all(table, ids).await?;

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(rows)
    }

    async fn create(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.create(table, id, changes).await
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &[SettingsChange],
    ) -> Result<(), ProviderError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.update(table, id, changes).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ProviderError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.delete(table, id).await
    }
}

/// Schema shared by the suites.
pub fn guild_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .add("prefix", "string", EntryOptions::new().default_value("!"))
        .unwrap()
        .add("language", "string", EntryOptions::new().default_value("en-US"))
        .unwrap()
        .add(
            "volume",
            "integer",
            EntryOptions::new().bounds(0.0, 100.0).inclusive(true).default_value(50),
        )
        .unwrap()
        .add("disabled", "string", EntryOptions::new().array())
        .unwrap()
        .add("nsfw", "boolean", EntryOptions::new())
        .unwrap()
        .add("owner", "string", EntryOptions::new().configurable(false))
        .unwrap()
        .add(
            "nickname",
            "string",
            EntryOptions::new().filter(|value, _| Ok(value.as_str() == Some("admin"))),
        )
        .unwrap()
        .add_folder("roles", |roles| {
            roles.add("admin", "string", EntryOptions::new())?;
            roles.add("muted", "string", EntryOptions::new())?;
            Ok(())
        })
        .unwrap()
        .add_folder("internal", |internal| {
            internal.add("shard", "integer", EntryOptions::new().configurable(false))?;
            Ok(())
        })
        .unwrap();
    schema
}

/// An initialized gateway over a fresh counting provider.
pub async fn gateway_with(kind: ProviderKind) -> (Arc<CountingProvider>, Gateway) {
    let provider = Arc::new(CountingProvider::new(kind));
    let mut providers = ProviderRegistry::new();
    providers.register(PROVIDER, provider.clone());

    let deps = GatewayDeps {
        serializers: Arc::new(SerializerRegistry::with_defaults()),
        providers: Arc::new(providers),
        provider: PROVIDER.to_string(),
        emitter: Arc::new(NoopEmitter::new()),
    };
    let gateway = Gateway::new(TABLE, guild_schema(), deps).unwrap();
    gateway.init().await.unwrap();
    (provider, gateway)
}

pub async fn gateway() -> (Arc<CountingProvider>, Gateway) {
    gateway_with(ProviderKind::Schemaless).await
}
