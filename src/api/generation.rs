//! Generation Request/Result Types
//!
//! Provider-agnostic value objects flowing through the router and council.

use serde::{Deserialize, Serialize};

/// How a request should be dispatched
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// One provider, with automatic failover through the fallback chain
    #[default]
    Single,

    /// Fan out to several providers and synthesize a consensus answer
    Council,
}

/// Sampling options forwarded to the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// A single generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User prompt
    pub prompt: String,

    /// Optional system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling options
    #[serde(default)]
    pub options: GenerationOptions,

    /// Provider to try first, before the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,

    /// Dispatch mode
    #[serde(default)]
    pub mode: GenerationMode,
}

impl GenerationRequest {
    /// Create a request with default options
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            options: GenerationOptions::default(),
            preferred_provider: None,
            mode: GenerationMode::Single,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Set the preferred provider
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature;
        self
    }

    /// Set the token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    /// Route through the council instead of a single provider
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// The outcome of a generation request
///
/// Always returned as a value: total failure is `success == false` with a
/// human-readable `error`, never a propagated error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Whether a usable answer was produced
    pub success: bool,

    /// The generated text (empty on failure)
    pub content: String,

    /// Provider that produced the answer ("none" on total failure,
    /// "council" for consensus answers)
    pub provider: String,

    /// Model that produced the answer
    pub model: String,

    /// Total tokens consumed, when the vendor reported usage
    pub tokens_used: u32,

    /// Wall-clock latency of the successful call (or of the whole attempt
    /// sequence on failure)
    pub latency_ms: f64,

    /// Human-readable failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    /// Build a failure result
    pub fn failure(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            provider: provider.into(),
            model: String::new(),
            tokens_used: 0,
            latency_ms: 0.0,
            error: Some(error.into()),
        }
    }
}
