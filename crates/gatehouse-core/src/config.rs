//! Driver configuration types.
//!
//! Pure data, loadable with serde. Which providers exist is decided by the
//! composition root; this only says which provider each gateway uses.

use std::env;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Provider used when neither the gateway nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "memory";

/// Environment variable overriding [`DriverConfig::default_provider`].
pub const PROVIDER_ENV: &str = "GATEHOUSE_PROVIDER";

/// Per-gateway overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Provider name for this gateway only.
    pub provider: Option<String>,
}

/// Configuration of a [`GatewayDriver`](crate::gateway::GatewayDriver).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Provider used by gateways without an override.
    pub default_provider: String,

    /// Overrides keyed by gateway name.
    pub gateways: IndexMap<String, GatewayConfig>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            gateways: IndexMap::new(),
        }
    }
}

impl DriverConfig {
    /// Defaults, with `GATEHOUSE_PROVIDER` as the default provider if set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(provider) = env::var(PROVIDER_ENV) {
            let provider = provider.trim();
            if !provider.is_empty() {
                config.default_provider = provider.to_string();
            }
        }
        config
    }

    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Route one gateway to a specific provider.
    #[must_use]
    pub fn with_gateway_provider(
        mut self,
        gateway: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        self.gateways.entry(gateway.into()).or_default().provider = Some(provider.into());
        self
    }

    /// The provider `gateway` should use.
    pub fn provider_for(&self, gateway: &str) -> &str {
        self.gateways
            .get(gateway)
            .and_then(|config| config.provider.as_deref())
            .unwrap_or(&self.default_provider)
    }
}
