//! Gateways: named collections of settings documents.
//!
//! A gateway owns one frozen schema, an in-memory cache of documents keyed
//! by entity id, a provider name and a request handler. It is the only
//! place that creates [`Settings`] documents.

mod driver;
mod request_handler;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::{join_all, try_join_all};
use thiserror::Error;

use crate::ports::{
    Provider, ProviderError, ProviderKind, ProviderRegistry, SettingsEventEmitter,
};
use crate::schema::{Schema, SchemaError};
use crate::serializer::SerializerRegistry;
use crate::settings::{Settings, SettingsError};

pub use driver::GatewayDriver;
pub use request_handler::{BatchFetcher, ProviderFetcher, RequestHandler};

/// Errors raised while building or initializing gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway '{gateway}' has an invalid schema: {source}")]
    Schema {
        gateway: String,
        #[source]
        source: SchemaError,
    },

    #[error("Gateway '{gateway}' could not be initialized: {source}")]
    Provider {
        gateway: String,
        #[source]
        source: ProviderError,
    },

    #[error("Provider initialization failed: {0}")]
    ProviderInit(#[from] ProviderError),

    #[error("A gateway named '{0}' is already registered")]
    DuplicateGateway(String),

    #[error("Gateways are already initialized")]
    AlreadyInitialized,

    #[error("No gateway named '{0}'")]
    UnknownGateway(String),
}

/// Shared state handed to every document of a gateway.
pub(crate) struct GatewayContext {
    pub(crate) name: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) provider_name: String,
    pub(crate) handler: RequestHandler,
    pub(crate) emitter: Arc<dyn SettingsEventEmitter>,
}

impl GatewayContext {
    /// Resolve the provider by name.
    pub(crate) fn provider(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers.get(&self.provider_name)
    }
}

/// Collaborators a gateway is built with.
#[derive(Clone)]
pub struct GatewayDeps {
    pub serializers: Arc<SerializerRegistry>,
    pub providers: Arc<ProviderRegistry>,
    /// Name of the provider in `providers` this gateway stores rows in.
    pub provider: String,
    pub emitter: Arc<dyn SettingsEventEmitter>,
}

/// A named collection of settings documents.
pub struct Gateway {
    context: Arc<GatewayContext>,
    cache: RwLock<HashMap<String, Arc<Settings>>>,
    ready: AtomicBool,
}

impl Gateway {
    /// Build a gateway, freezing `schema` against the serializer registry.
    pub fn new(
        name: impl Into<String>,
        mut schema: Schema,
        deps: GatewayDeps,
    ) -> Result<Self, GatewayError> {
        let name = name.into();
        schema
            .freeze(&deps.serializers)
            .map_err(|source| GatewayError::Schema {
                gateway: name.clone(),
                source,
            })?;

        let fetcher = ProviderFetcher::new(
            Arc::clone(&deps.providers),
            deps.provider.clone(),
            name.clone(),
        );
        let context = GatewayContext {
            name,
            schema: Arc::new(schema),
            providers: deps.providers,
            provider_name: deps.provider,
            handler: RequestHandler::new(Arc::new(fetcher)),
            emitter: deps.emitter,
        };

        Ok(Self {
            context: Arc::new(context),
            cache: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn schema(&self) -> &Schema {
        &self.context.schema
    }

    /// Name of the provider backing this gateway.
    pub fn provider_name(&self) -> &str {
        &self.context.provider_name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Ensure the backing table exists and carries a column per entry.
    ///
    /// Safe to call more than once.
    pub async fn init(&self) -> Result<(), GatewayError> {
        let name = self.name();
        let wrap = |source: ProviderError| GatewayError::Provider {
            gateway: name.to_string(),
            source,
        };
        let provider = self.context.provider().map_err(wrap)?;

        if !provider.has_table(name).await.map_err(wrap)? {
            provider.create_table(name).await.map_err(wrap)?;
            tracing::info!(gateway = %name, provider = %self.provider_name(), "Created settings table");
        }

        if provider.kind() == ProviderKind::SchemaOnWrite {
            let columns = provider.get_columns(name).await.map_err(wrap)?;
            for entry in self.schema().leaves() {
                if !columns.iter().any(|column| column == entry.path()) {
                    provider.add_column(name, entry).await.map_err(wrap)?;
                    tracing::debug!(gateway = %name, column = %entry.path(), "Added settings column");
                }
            }
        }

        self.ready.store(true, Ordering::Release);
        tracing::info!(gateway = %name, entries = self.schema().leaves().len(), "Gateway initialized");
        Ok(())
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// The cached document for `id`, or a new one seeded with defaults.
    ///
    /// New documents start synchronizing in the background when called
    /// inside a tokio runtime and the schema has at least one key.
    pub fn acquire(&self, id: &str) -> Arc<Settings> {
        self.acquire_with(id, true)
    }

    fn acquire_with(&self, id: &str, background_sync: bool) -> Arc<Settings> {
        if let Some(settings) = self.get(id) {
            return settings;
        }

        let (settings, created) = {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            match cache.get(id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let settings = Arc::new(Settings::new(id, Arc::clone(&self.context)));
                    cache.insert(id.to_string(), Arc::clone(&settings));
                    (settings, true)
                }
            }
        };

        if created && background_sync && !self.schema().is_empty() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let document = Arc::clone(&settings);
                runtime.spawn(async move {
                    if let Err(err) = document.sync(false).await {
                        tracing::warn!(
                            gateway = %document.gateway_name(),
                            id = %document.id(),
                            error = %err,
                            "Background settings sync failed"
                        );
                    }
                });
            }
        }

        settings
    }

    /// The cached document for `id`, without creating one.
    pub fn get(&self, id: &str) -> Option<Arc<Settings>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Acquire the document for `id` and synchronize it.
    pub async fn sync(&self, id: &str, force: bool) -> Result<Arc<Settings>, SettingsError> {
        let settings = self.acquire(id);
        settings.sync(force).await?;
        Ok(settings)
    }

    /// Synchronize several documents; reads are coalesced into one batch.
    pub async fn sync_many(
        &self,
        ids: &[&str],
        force: bool,
    ) -> Result<Vec<Arc<Settings>>, SettingsError> {
        try_join_all(ids.iter().map(|id| self.sync(id, force))).await
    }

    /// Load every stored row into the cache with one provider read.
    ///
    /// Returns the number of rows loaded.
    pub async fn sync_all(&self) -> Result<usize, SettingsError> {
        let provider = self.context.provider()?;
        let observed: HashMap<String, u64> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, settings)| (id.clone(), settings.generation()))
            .collect();
        let rows = provider.get_all(self.name(), None).await?;

        let mut loaded = 0;
        for row in &rows {
            let Some(id) = row.get("id").and_then(serde_json::Value::as_str) else {
                tracing::warn!(gateway = %self.name(), "Skipping settings row without an id");
                continue;
            };
            let generation = observed.get(id).copied().unwrap_or_default();
            if self.acquire_with(id, false).apply_row(row, generation) {
                loaded += 1;
            }
        }

        tracing::debug!(gateway = %self.name(), rows = loaded, "Loaded all settings");
        Ok(loaded)
    }

    /// Destroy the document for `id` and drop it from the cache.
    pub async fn destroy(&self, id: &str) -> Result<(), SettingsError> {
        let settings = self.acquire(id);
        settings.destroy().await?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    /// Destroy several documents concurrently.
    pub async fn destroy_many(&self, ids: &[&str]) -> Vec<Result<(), SettingsError>> {
        join_all(ids.iter().map(|id| self.destroy(id))).await
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the cached documents, sorted.
    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.context.name)
            .field("provider", &self.context.provider_name)
            .field("cached", &self.len())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
