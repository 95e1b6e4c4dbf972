//! Gateway Error Types
//!
//! Error taxonomy for key pools, circuit breakers, routing and the council.

use std::time::Duration;
use thiserror::Error;

/// Main error type for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration errors (invalid JSON, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider not found in the configured catalog
    #[error("Provider '{0}' not configured. Add it to llmgate.json with `base_url` and `default_model`")]
    ProviderNotFound(String),

    /// All credentials for a provider are disabled or cooling down
    #[error("No API keys available for '{provider}'. Set {}_API_KEY or {}_API_KEYS, or wait for cooldowns to expire", .provider.to_uppercase(), .provider.to_uppercase())]
    NoAvailableKey { provider: String },

    /// The circuit breaker refused the call without attempting it
    #[error("Circuit '{name}' is open, retry in {}s", .retry_in.as_secs())]
    CircuitOpen { name: String, retry_in: Duration },

    /// The vendor returned a non-success response
    #[error("Upstream error from '{provider}' (status {status}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// A success response carried no usable content
    #[error("Failed to parse response from '{provider}': {message}")]
    Parse { provider: String, message: String },

    /// Authentication rejected by the vendor
    #[error("Authentication failed for '{provider}': {message}. Check your API key")]
    Auth { provider: String, message: String },

    /// Deadline exceeded mid-call
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Router exhausted the primary provider and the whole fallback chain
    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),

    /// Council fan-out produced zero usable answers
    #[error("All council members failed: {0}")]
    AllCouncilMembersFailed(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether this error represents an actual failed call to the upstream,
    /// as opposed to a call that was never made. Only real call failures
    /// count toward credential health and breaker state.
    pub fn is_call_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Upstream { .. }
                | GatewayError::Parse { .. }
                | GatewayError::Auth { .. }
                | GatewayError::Timeout(_)
                | GatewayError::Internal(_)
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_connect() {
            GatewayError::Internal(format!("Connection failed: {}", err))
        } else {
            GatewayError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Config(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
