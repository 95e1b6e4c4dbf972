//! Provider Profiles and Gateway Settings
//!
//! Defines the configuration schema for providers and the gateway tunables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider profiles keyed by provider name
    pub providers: HashMap<String, ProviderProfile>,

    /// Provider tried first when a request carries no preference
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Ordered provider names tried after the first candidate fails
    #[serde(default)]
    pub fallback_chain: Vec<String>,

    /// Circuit breaker tunables
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Credential cooldown tunables
    #[serde(default)]
    pub cooldown: CooldownSettings,

    /// Council tunables
    #[serde(default)]
    pub council: CouncilSettings,

    /// Per-call deadline in seconds for a single upstream request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl GatewayConfig {
    /// Per-call deadline for one upstream request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply environment overrides for routing and tunables.
    ///
    /// `LLM_DEFAULT_PROVIDER` and `LLM_FALLBACK_CHAIN` (comma-separated)
    /// take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(default) = std::env::var("LLM_DEFAULT_PROVIDER") {
            if !default.trim().is_empty() {
                self.default_provider = default.trim().to_string();
            }
        }

        if let Ok(chain) = std::env::var("LLM_FALLBACK_CHAIN") {
            let parsed: Vec<String> = chain
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.fallback_chain = parsed;
            }
        }

        if let Some(threshold) = env_parse::<u32>("LLM_BREAKER_FAILURE_THRESHOLD") {
            self.breaker.failure_threshold = threshold;
        }
        if let Some(secs) = env_parse::<u64>("LLM_BREAKER_RECOVERY_TIMEOUT_SECS") {
            self.breaker.recovery_timeout_secs = secs;
        }
        if let Some(cap) = env_parse::<u64>("LLM_KEY_COOLDOWN_CAP_MINUTES") {
            self.cooldown.backoff_cap_minutes = cap;
        }
        if let Some(threshold) = env_parse::<u32>("LLM_KEY_DISABLE_THRESHOLD") {
            self.cooldown.disable_threshold = threshold;
        }
    }

    /// Collect the configured secrets for a provider from the environment.
    ///
    /// `<PROVIDER>_API_KEYS` (comma-separated) is read first, then
    /// `<PROVIDER>_API_KEY` for a single key. Missing vars yield an empty
    /// set, which is reported as unavailable rather than a fatal error.
    pub fn provider_secrets(&self, provider: &str) -> Vec<String> {
        let upper = provider.to_uppercase();
        let mut secrets = Vec::new();

        if let Ok(joined) = std::env::var(format!("{}_API_KEYS", upper)) {
            for secret in joined.split(',') {
                let secret = secret.trim();
                if !secret.is_empty() && !secrets.iter().any(|s| s == secret) {
                    secrets.push(secret.to_string());
                }
            }
        }

        if let Ok(single) = std::env::var(format!("{}_API_KEY", upper)) {
            let single = single.trim();
            if !single.is_empty() && !secrets.iter().any(|s| s == single) {
                secrets.push(single.to_string());
            }
        }

        secrets
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

/// Static configuration for a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Base URL for the API
    pub base_url: String,

    /// Wire dialect spoken by this provider
    #[serde(default)]
    pub kind: ProviderKind,

    /// Model used when the request does not name one
    pub default_model: String,

    /// Models this provider is known to serve
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    /// Selection tier for council membership ordering
    #[serde(default)]
    pub tier: ProviderTier,
}

/// Wire dialect of a provider endpoint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-style chat completions (openai, groq, mistral, openrouter)
    #[default]
    Openai,

    /// Anthropic messages API
    Anthropic,

    /// Google Gemini generateContent API
    Gemini,
}

/// Council member ordering: fast/cheap tier is preferred over fallback tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    #[default]
    Fast,
    Fallback,
}

/// Circuit breaker tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before a breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker refuses calls before a half-open trial
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,

    /// Per-breaker overrides keyed by breaker name (e.g. "llm_groq")
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, BreakerOverride>,
}

/// Override of the default breaker settings for one named breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_timeout_secs: Option<u64>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    60
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            overrides: HashMap::new(),
        }
    }
}

impl BreakerSettings {
    /// Effective (threshold, recovery timeout) for a named breaker
    pub fn for_breaker(&self, name: &str) -> (u32, Duration) {
        let threshold = self
            .overrides
            .get(name)
            .and_then(|o| o.failure_threshold)
            .unwrap_or(self.failure_threshold);
        let timeout = self
            .overrides
            .get(name)
            .and_then(|o| o.recovery_timeout_secs)
            .unwrap_or(self.recovery_timeout_secs);
        (threshold, Duration::from_secs(timeout))
    }
}

/// Credential cooldown tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownSettings {
    /// Consecutive failures before cooldowns start
    #[serde(default = "default_cooldown_floor")]
    pub backoff_floor: u32,

    /// Cap on the exponential cooldown, in minutes
    #[serde(default = "default_cooldown_cap")]
    pub backoff_cap_minutes: u64,

    /// Consecutive failures after which a credential is permanently disabled
    #[serde(default = "default_disable_threshold")]
    pub disable_threshold: u32,
}

fn default_cooldown_floor() -> u32 {
    3
}

fn default_cooldown_cap() -> u64 {
    60
}

fn default_disable_threshold() -> u32 {
    10
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            backoff_floor: default_cooldown_floor(),
            backoff_cap_minutes: default_cooldown_cap(),
            disable_threshold: default_disable_threshold(),
        }
    }
}

/// Council tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilSettings {
    /// Maximum distinct members fanned out to
    #[serde(default = "default_max_members")]
    pub max_members: usize,

    /// Per-member deadline in seconds during fan-out and review
    #[serde(default = "default_member_timeout")]
    pub member_timeout_secs: u64,

    /// Whether members peer-review each other before synthesis
    #[serde(default = "default_true")]
    pub peer_review: bool,

    /// Chairman candidates in priority order; first with usable keys wins
    #[serde(default = "default_chairman_priority")]
    pub chairman_priority: Vec<String>,
}

fn default_max_members() -> usize {
    5
}

fn default_member_timeout() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_chairman_priority() -> Vec<String> {
    vec![
        "anthropic".to_string(),
        "openai".to_string(),
        "gemini".to_string(),
        "groq".to_string(),
        "mistral".to_string(),
    ]
}

impl Default for CouncilSettings {
    fn default() -> Self {
        Self {
            max_members: default_max_members(),
            member_timeout_secs: default_member_timeout(),
            peer_review: default_true(),
            chairman_priority: default_chairman_priority(),
        }
    }
}

impl CouncilSettings {
    /// Per-member deadline during fan-out and review
    pub fn member_timeout(&self) -> Duration {
        Duration::from_secs(self.member_timeout_secs)
    }
}
