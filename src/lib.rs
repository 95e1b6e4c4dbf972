//! llmgate - LLM Gateway
//!
//! Dispatches generation requests across interchangeable completion
//! providers: rotating health-tracked key pools per provider, a circuit
//! breaker per upstream, a failover router, and a council mode that fuses
//! several providers' answers into one.

use std::collections::HashMap;
use std::sync::Arc;

pub mod adapter;
pub mod api;
pub mod breaker;
pub mod client;
pub mod config;
pub mod council;
pub mod error;
pub mod router;

use adapter::HttpAdapterFactory;
use breaker::{CircuitBreakerRegistry, CircuitState};
use client::HttpClient;
use config::{ConfigLoader, GatewayConfig, ProviderTier};
use council::Council;
use router::{KeyPools, PoolStatus, Router};

pub use api::{GenerationMode, GenerationOptions, GenerationRequest, GenerationResult};
pub use error::{GatewayError, Result};

/// The gateway: one process-wide instance, constructed once and shared
pub struct Gateway {
    config: Arc<GatewayConfig>,
    pools: Arc<KeyPools>,
    breakers: Arc<CircuitBreakerRegistry>,
    router: Arc<Router>,
    council: Council,
}

impl Gateway {
    /// Create a gateway from the default configuration sources
    pub fn new() -> Result<Self> {
        // Best-effort .env loading before secrets are read
        let _ = dotenvy::dotenv();

        let loader = ConfigLoader::new()?;
        Self::from_config(loader.into_config())
    }

    /// Create a gateway with a specific config file layered over builtins
    pub fn with_config_path(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let loader = ConfigLoader::from_path(path)?;
        Self::from_config(loader.into_config())
    }

    /// Create a gateway from an already-built configuration
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let config = Arc::new(config);
        let pools = Arc::new(KeyPools::from_config(&config));
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));

        let http = HttpClient::new(config.request_timeout())?;
        let factory = Arc::new(HttpAdapterFactory::new(http));

        let router = Arc::new(Router::new(
            Arc::clone(&config),
            Arc::clone(&pools),
            Arc::clone(&breakers),
            factory,
        ));
        let council = Council::new(Arc::clone(&router));

        Ok(Self {
            config,
            pools,
            breakers,
            router,
            council,
        })
    }

    /// Satisfy one request, dispatching on its mode.
    ///
    /// Callers always get a `GenerationResult` value; total failure is
    /// `success == false` with a readable `error`.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        match request.mode {
            GenerationMode::Single => self.router.generate(request).await,
            GenerationMode::Council => self.council.deliberate(request).await,
        }
    }

    /// The shared router, for callers that want failover without the facade
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// List configured provider names
    pub fn providers(&self) -> Vec<String> {
        self.config.providers.keys().cloned().collect()
    }

    /// Static profile plus live key health for one provider
    pub fn provider_info(&self, name: &str) -> Option<ProviderInfo> {
        let profile = self.config.providers.get(name)?;
        Some(ProviderInfo {
            name: name.to_string(),
            base_url: profile.base_url.clone(),
            default_model: profile.default_model.clone(),
            models: profile.models.clone(),
            tier: profile.tier,
            keys: self.pools.get(name).map(|p| p.status()),
        })
    }

    /// Observability snapshot: key pools and breaker states
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            pools: self.pools.status(),
            breakers: self.breakers.states(),
        }
    }
}

/// Provider information surfaced for observability
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub base_url: String,
    pub default_model: String,
    pub models: Vec<String>,
    pub tier: ProviderTier,
    pub keys: Option<PoolStatus>,
}

/// Live health snapshot of the whole gateway
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub pools: HashMap<String, PoolStatus>,
    pub breakers: HashMap<String, CircuitState>,
}
