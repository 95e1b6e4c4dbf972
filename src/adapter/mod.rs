//! Provider Adapters
//!
//! One adapter per wire dialect, all behind a single capability trait.
//! Adapters hold no shared mutable state; the factory constructs one per
//! call from the profile, the selected secret and the model.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::client::HttpClient;
use crate::config::{ProviderKind, ProviderProfile};
use crate::error::Result;
use async_trait::async_trait;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// One upstream call, already resolved to a concrete model
#[derive(Debug, Clone)]
pub struct AdapterCall {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: String,
}

/// What an adapter extracts from a vendor response
#[derive(Debug, Clone)]
pub struct AdapterReply {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
}

/// The provider capability: send a prompt, get text back
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name this adapter speaks for
    fn name(&self) -> &str;

    /// Perform one generation call
    async fn generate(&self, call: &AdapterCall) -> Result<AdapterReply>;
}

/// Builds adapters per call; injectable so routing logic is testable
/// without the network.
pub trait AdapterFactory: Send + Sync {
    /// Construct an adapter for `(provider, secret)`, or `None` when the
    /// provider's dialect has no implementation.
    fn build(
        &self,
        provider: &str,
        profile: &ProviderProfile,
        secret: &str,
    ) -> Option<Box<dyn ProviderAdapter>>;
}

/// Factory producing real HTTP-backed adapters
pub struct HttpAdapterFactory {
    http: HttpClient,
}

impl HttpAdapterFactory {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn build(
        &self,
        provider: &str,
        profile: &ProviderProfile,
        secret: &str,
    ) -> Option<Box<dyn ProviderAdapter>> {
        let adapter: Box<dyn ProviderAdapter> = match profile.kind {
            ProviderKind::Openai => Box::new(OpenAiAdapter::new(
                provider,
                &profile.base_url,
                secret,
                self.http.clone(),
            )),
            ProviderKind::Anthropic => Box::new(AnthropicAdapter::new(
                provider,
                &profile.base_url,
                secret,
                self.http.clone(),
            )),
            ProviderKind::Gemini => Box::new(GeminiAdapter::new(
                provider,
                &profile.base_url,
                secret,
                self.http.clone(),
            )),
        };

        Some(adapter)
    }
}
