//! Gateway driver: the registry of gateways.
//!
//! Initialization order is fixed: providers first, then gateways in the
//! order they were registered. Any failure aborts `init`.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Gateway, GatewayDeps, GatewayError};
use crate::config::DriverConfig;
use crate::ports::{NoopEmitter, ProviderError, ProviderRegistry, SettingsEventEmitter};
use crate::schema::Schema;
use crate::serializer::SerializerRegistry;

struct Registration {
    schema: Schema,
    provider: Option<String>,
}

/// Registry of gateways by name.
pub struct GatewayDriver {
    serializers: Arc<SerializerRegistry>,
    providers: Arc<ProviderRegistry>,
    config: DriverConfig,
    emitter: Arc<dyn SettingsEventEmitter>,
    registrations: IndexMap<String, Registration>,
    gateways: IndexMap<String, Arc<Gateway>>,
    ready: bool,
}

impl GatewayDriver {
    pub fn new(
        serializers: SerializerRegistry,
        providers: ProviderRegistry,
        config: DriverConfig,
    ) -> Self {
        Self {
            serializers: Arc::new(serializers),
            providers: Arc::new(providers),
            config,
            emitter: Arc::new(NoopEmitter::new()),
            registrations: IndexMap::new(),
            gateways: IndexMap::new(),
            ready: false,
        }
    }

    /// Send change notifications of every gateway to `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn SettingsEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Register a gateway using the configured provider.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<&mut Self, GatewayError> {
        self.insert(name.into(), schema, None)
    }

    /// Register a gateway stored in a specific provider.
    pub fn register_with_provider(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
        provider: impl Into<String>,
    ) -> Result<&mut Self, GatewayError> {
        self.insert(name.into(), schema, Some(provider.into()))
    }

    fn insert(
        &mut self,
        name: String,
        schema: Schema,
        provider: Option<String>,
    ) -> Result<&mut Self, GatewayError> {
        if self.ready {
            return Err(GatewayError::AlreadyInitialized);
        }
        if self.registrations.contains_key(&name) {
            return Err(GatewayError::DuplicateGateway(name));
        }
        self.registrations.insert(name, Registration { schema, provider });
        Ok(self)
    }

    /// Initialize providers, then every registered gateway in order.
    pub async fn init(&mut self) -> Result<(), GatewayError> {
        if self.ready {
            return Err(GatewayError::AlreadyInitialized);
        }

        self.providers.init_all().await?;

        for (name, registration) in std::mem::take(&mut self.registrations) {
            let provider = registration
                .provider
                .unwrap_or_else(|| self.config.provider_for(&name).to_string());
            let deps = GatewayDeps {
                serializers: Arc::clone(&self.serializers),
                providers: Arc::clone(&self.providers),
                provider,
                emitter: Arc::clone(&self.emitter),
            };

            let gateway = Gateway::new(name.clone(), registration.schema, deps)?;
            gateway.init().await?;
            self.gateways.insert(name, Arc::new(gateway));
        }

        self.ready = true;
        tracing::info!(gateways = self.gateways.len(), "Gateway driver initialized");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Gateway>> {
        self.gateways.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn gateway(&self, name: &str) -> Result<Arc<Gateway>, GatewayError> {
        self.get(name)
            .ok_or_else(|| GatewayError::UnknownGateway(name.to_string()))
    }

    /// Names of the registered gateways, in registration order.
    pub fn names(&self) -> Vec<&str> {
        if self.ready {
            self.gateways.keys().map(String::as_str).collect()
        } else {
            self.registrations.keys().map(String::as_str).collect()
        }
    }

    /// Initialized gateways in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Gateway>> {
        self.gateways.values()
    }

    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Shut every provider down.
    pub async fn shutdown(&self) -> Result<(), ProviderError> {
        self.providers.shutdown_all().await
    }
}

impl std::fmt::Debug for GatewayDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayDriver")
            .field("gateways", &self.names())
            .field("providers", &self.providers.names())
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}
