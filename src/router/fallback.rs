//! Fallback Router
//!
//! Satisfies one generation request with automatic provider failover:
//! preferred (or default) provider first, then the configured fallback
//! chain, strictly in order, stopping at the first success.

use crate::adapter::{AdapterCall, AdapterFactory};
use crate::api::{GenerationRequest, GenerationResult};
use crate::breaker::CircuitBreakerRegistry;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::router::key_pool::KeyPools;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Routes one request through the failover chain
pub struct Router {
    config: Arc<GatewayConfig>,
    pools: Arc<KeyPools>,
    breakers: Arc<CircuitBreakerRegistry>,
    factory: Arc<dyn AdapterFactory>,
}

impl Router {
    pub fn new(
        config: Arc<GatewayConfig>,
        pools: Arc<KeyPools>,
        breakers: Arc<CircuitBreakerRegistry>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self {
            config,
            pools,
            breakers,
            factory,
        }
    }

    /// Key pool registry shared with the council
    pub fn pools(&self) -> &Arc<KeyPools> {
        &self.pools
    }

    /// Gateway configuration shared with the council
    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    /// Candidate providers in the exact order they will be tried
    fn candidates(&self, request: &GenerationRequest) -> Vec<String> {
        let first = request
            .preferred_provider
            .as_deref()
            .filter(|p| self.config.providers.contains_key(*p))
            .unwrap_or(&self.config.default_provider)
            .to_string();

        let mut candidates = vec![first];
        for provider in &self.config.fallback_chain {
            if !candidates.contains(provider) && self.config.providers.contains_key(provider) {
                candidates.push(provider.clone());
            }
        }

        candidates
    }

    /// One attempt against a single provider, under the configured
    /// request deadline.
    pub async fn try_generate(
        &self,
        provider: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        self.try_generate_within(provider, request, self.config.request_timeout())
            .await
    }

    /// One attempt against a single provider with an explicit deadline.
    ///
    /// The deadline fires inside the breaker-wrapped call, so an attempt
    /// that runs out of time resolves to `Timeout` and counts against key
    /// health and breaker state like any other failed call. Callers with
    /// their own deadline (the council) pass it here instead of cancelling
    /// from outside, which would leave the bookkeeping unresolved.
    ///
    /// Key health and breaker state are only updated for calls that were
    /// actually made: `CircuitOpen` and `NoAvailableKey` leave both alone.
    pub async fn try_generate_within(
        &self,
        provider: &str,
        request: &GenerationRequest,
        deadline: Duration,
    ) -> Result<GenerationResult> {
        let profile = self
            .config
            .providers
            .get(provider)
            .ok_or_else(|| GatewayError::ProviderNotFound(provider.to_string()))?;

        let pool = self
            .pools
            .get(provider)
            .ok_or_else(|| GatewayError::NoAvailableKey {
                provider: provider.to_string(),
            })?;
        let secret = pool.acquire().ok_or_else(|| GatewayError::NoAvailableKey {
            provider: provider.to_string(),
        })?;

        let adapter = self
            .factory
            .build(provider, profile, &secret)
            .ok_or_else(|| GatewayError::ProviderNotFound(provider.to_string()))?;

        let call = AdapterCall {
            prompt: request.prompt.clone(),
            system: request.system_prompt.clone(),
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            model: profile.default_model.clone(),
        };

        let breaker = self.breakers.get(&format!("llm_{}", provider));
        let started = Instant::now();

        let attempt = async {
            match tokio::time::timeout(deadline, adapter.generate(&call)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(format!(
                    "'{}' exceeded the {}s deadline",
                    provider,
                    deadline.as_secs()
                ))),
            }
        };
        let outcome = breaker.call(move || attempt).await;

        match outcome {
            Ok(reply) => {
                pool.mark_success(&secret);
                debug!(provider, model = %reply.model, "generation succeeded");
                Ok(GenerationResult {
                    success: true,
                    content: reply.content,
                    provider: provider.to_string(),
                    model: reply.model,
                    tokens_used: reply.tokens_used,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error: None,
                })
            }
            Err(err) => {
                if err.is_call_failure() {
                    pool.mark_failure(&secret);
                }
                Err(err)
            }
        }
    }

    /// Satisfy the request, falling through the chain on failure.
    ///
    /// Always returns a value; exhaustion yields `success == false` with
    /// `provider == "none"`.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let started = Instant::now();
        let mut last_error: Option<GatewayError> = None;

        for provider in self.candidates(request) {
            match self.try_generate(&provider, request).await {
                Ok(result) => return result,
                Err(err) => {
                    warn!(provider = %provider, error = %err, "provider attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no providers configured".to_string());
        let mut result = GenerationResult::failure(
            "none",
            GatewayError::AllProvidersFailed(detail).to_string(),
        );
        result.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapter::{AdapterReply, ProviderAdapter};
    use crate::config::{
        BreakerSettings, CooldownSettings, CouncilSettings, ProviderKind, ProviderProfile,
        ProviderTier,
    };
    use crate::router::key_pool::KeyPool;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// What a scripted provider does when called
    #[derive(Debug, Clone)]
    pub(crate) enum Behavior {
        Succeed(&'static str),
        FailUpstream,
        /// Never answers within any reasonable deadline
        Hang,
    }

    struct ScriptedAdapter {
        provider: String,
        behavior: Behavior,
        calls: Arc<Mutex<Vec<String>>>,
        temperatures: Arc<Mutex<Vec<f32>>>,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            &self.provider
        }

        async fn generate(&self, call: &AdapterCall) -> Result<AdapterReply> {
            self.calls.lock().push(self.provider.clone());
            self.temperatures.lock().push(call.temperature);
            match &self.behavior {
                Behavior::Succeed(content) => Ok(AdapterReply {
                    content: content.to_string(),
                    model: call.model.clone(),
                    tokens_used: 7,
                }),
                Behavior::FailUpstream => Err(GatewayError::Upstream {
                    provider: self.provider.clone(),
                    status: 500,
                    message: "scripted failure".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(GatewayError::Internal("unreachable".to_string()))
                }
            }
        }
    }

    /// Factory handing out scripted adapters; records call order and the
    /// sampling temperature each call carried
    pub(crate) struct ScriptedFactory {
        behaviors: HashMap<String, Behavior>,
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
        temperatures: Arc<Mutex<Vec<f32>>>,
    }

    impl ScriptedFactory {
        pub(crate) fn new(behaviors: &[(&str, Behavior)]) -> Self {
            Self {
                behaviors: behaviors
                    .iter()
                    .map(|(name, b)| (name.to_string(), b.clone()))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
                temperatures: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn call_order(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub(crate) fn temperatures(&self) -> Vec<f32> {
            self.temperatures.lock().clone()
        }
    }

    impl AdapterFactory for ScriptedFactory {
        fn build(
            &self,
            provider: &str,
            _profile: &ProviderProfile,
            _secret: &str,
        ) -> Option<Box<dyn ProviderAdapter>> {
            let behavior = self.behaviors.get(provider)?.clone();
            Some(Box::new(ScriptedAdapter {
                provider: provider.to_string(),
                behavior,
                calls: Arc::clone(&self.calls),
                temperatures: Arc::clone(&self.temperatures),
            }))
        }
    }

    pub(crate) fn profile(tier: ProviderTier) -> ProviderProfile {
        ProviderProfile {
            base_url: "http://localhost".to_string(),
            kind: ProviderKind::Openai,
            default_model: "test-model".to_string(),
            models: vec![],
            tier,
        }
    }

    pub(crate) fn test_config(
        providers: &[&str],
        default: &str,
        chain: &[&str],
    ) -> Arc<GatewayConfig> {
        Arc::new(GatewayConfig {
            providers: providers
                .iter()
                .map(|name| (name.to_string(), profile(ProviderTier::Fast)))
                .collect(),
            default_provider: default.to_string(),
            fallback_chain: chain.iter().map(|s| s.to_string()).collect(),
            breaker: BreakerSettings::default(),
            cooldown: CooldownSettings::default(),
            council: CouncilSettings::default(),
            request_timeout_secs: 5,
        })
    }

    pub(crate) fn pools_with_keys(providers: &[(&str, &[&str])]) -> Arc<KeyPools> {
        Arc::new(KeyPools::from_pools(
            providers
                .iter()
                .map(|(name, keys)| {
                    KeyPool::from_secrets(
                        name.to_string(),
                        keys.iter().map(|k| k.to_string()).collect(),
                        CooldownSettings::default(),
                    )
                })
                .collect(),
        ))
    }

    fn router(
        config: Arc<GatewayConfig>,
        pools: Arc<KeyPools>,
        factory: Arc<ScriptedFactory>,
    ) -> Router {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        Router::new(config, pools, breakers, factory)
    }

    #[tokio::test]
    async fn test_fallback_ordering_stops_at_first_success() {
        let config = test_config(
            &["openai", "gemini", "groq", "mistral"],
            "openai",
            &["gemini", "groq", "mistral"],
        );
        let pools = pools_with_keys(&[
            ("openai", &["k-o"]),
            ("gemini", &["k-ge"]),
            ("groq", &["k-gr"]),
            ("mistral", &["k-m"]),
        ]);
        let factory = Arc::new(ScriptedFactory::new(&[
            ("openai", Behavior::FailUpstream),
            ("gemini", Behavior::FailUpstream),
            ("groq", Behavior::Succeed("from groq")),
            ("mistral", Behavior::Succeed("never reached")),
        ]));

        let router = router(config, pools, Arc::clone(&factory));
        let request = GenerationRequest::new("2+2?").with_provider("openai");
        let result = router.generate(&request).await;

        assert!(result.success);
        assert_eq!(result.provider, "groq");
        assert_eq!(result.content, "from groq");
        assert_eq!(factory.call_order(), vec!["openai", "gemini", "groq"]);
    }

    #[tokio::test]
    async fn test_preferred_with_no_keys_falls_through() {
        let config = test_config(&["groq", "gemini", "mistral"], "gemini", &["gemini", "mistral"]);
        // groq is configured but holds zero keys
        let pools = pools_with_keys(&[("groq", &[]), ("gemini", &["k-ge"]), ("mistral", &["k-m"])]);
        let factory = Arc::new(ScriptedFactory::new(&[
            ("groq", Behavior::Succeed("unreachable without keys")),
            ("gemini", Behavior::Succeed("from gemini")),
            ("mistral", Behavior::Succeed("never reached")),
        ]));

        let router = router(config, pools, Arc::clone(&factory));
        let request = GenerationRequest::new("2+2?").with_provider("groq");
        let result = router.generate(&request).await;

        assert!(result.success);
        assert_eq!(result.provider, "gemini");
        // groq's adapter was never invoked; no call was possible
        assert_eq!(factory.call_order(), vec!["gemini"]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_terminal_failure_value() {
        let config = test_config(&["openai", "gemini"], "openai", &["gemini"]);
        let pools = pools_with_keys(&[("openai", &["k-o"]), ("gemini", &["k-ge"])]);
        let factory = Arc::new(ScriptedFactory::new(&[
            ("openai", Behavior::FailUpstream),
            ("gemini", Behavior::FailUpstream),
        ]));

        let router = router(config, pools, factory);
        let result = router.generate(&GenerationRequest::new("2+2?")).await;

        assert!(!result.success);
        assert_eq!(result.provider, "none");
        assert!(result.error.as_deref().unwrap().contains("All providers failed"));
    }

    #[tokio::test]
    async fn test_unknown_preferred_provider_uses_default() {
        let config = test_config(&["openai"], "openai", &[]);
        let pools = pools_with_keys(&[("openai", &["k-o"])]);
        let factory = Arc::new(ScriptedFactory::new(&[(
            "openai",
            Behavior::Succeed("from default"),
        )]));

        let router = router(config, pools, Arc::clone(&factory));
        let request = GenerationRequest::new("2+2?").with_provider("nonexistent");
        let result = router.generate(&request).await;

        assert!(result.success);
        assert_eq!(result.provider, "openai");
    }

    #[tokio::test]
    async fn test_failures_feed_key_cooldown() {
        let config = test_config(&["openai"], "openai", &[]);
        let pools = pools_with_keys(&[("openai", &["k-o"])]);
        let factory = Arc::new(ScriptedFactory::new(&[("openai", Behavior::FailUpstream)]));

        let router = router(Arc::clone(&config), Arc::clone(&pools), factory);
        for _ in 0..3 {
            let _ = router.generate(&GenerationRequest::new("2+2?")).await;
        }

        let status = pools.get("openai").unwrap().status();
        assert_eq!(status.in_cooldown, 1);
    }

    #[tokio::test]
    async fn test_deadline_expiry_counts_as_call_failure() {
        let config = test_config(&["openai"], "openai", &[]);
        let pools = pools_with_keys(&[("openai", &["k-o"])]);
        let factory = Arc::new(ScriptedFactory::new(&[("openai", Behavior::Hang)]));

        let router = router(Arc::clone(&config), Arc::clone(&pools), factory);
        let err = router
            .try_generate_within(
                "openai",
                &GenerationRequest::new("2+2?"),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout(_)));
        // The expired attempt was a real call: the key took the failure
        let creds = pools.get("openai").unwrap().credentials();
        assert_eq!(creds[0].consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_circuit_open_does_not_penalize_keys() {
        let config = test_config(&["openai"], "openai", &[]);
        let pools = pools_with_keys(&[("openai", &["k-o"])]);
        let factory = Arc::new(ScriptedFactory::new(&[(
            "openai",
            Behavior::Succeed("unused"),
        )]));
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));

        // Force the breaker open before any call
        let breaker = breakers.get("llm_openai");
        for _ in 0..5 {
            breaker.record_failure();
        }

        let router = Router::new(Arc::clone(&config), Arc::clone(&pools), breakers, factory);
        let err = router
            .try_generate("openai", &GenerationRequest::new("2+2?"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        // No call was made, so the key keeps its clean record
        let status = pools.get("openai").unwrap().status();
        assert_eq!(status.in_cooldown, 0);
        assert_eq!(status.available, 1);
    }
}
