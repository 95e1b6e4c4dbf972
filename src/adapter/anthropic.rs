//! Anthropic Messages Adapter

use crate::adapter::{AdapterCall, AdapterReply, ProviderAdapter};
use crate::client::HttpClient;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

pub struct AnthropicAdapter {
    provider: String,
    base_url: String,
    secret: String,
    http: HttpClient,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<MessagesMessage<'a>>,
}

#[derive(Serialize)]
struct MessagesMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<MessagesContent>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct MessagesContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(provider: &str, base_url: &str, secret: &str, http: HttpClient) -> Self {
        Self {
            provider: provider.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
            http,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, call: &AdapterCall) -> Result<AdapterReply> {
        let body = MessagesRequest {
            model: &call.model,
            max_tokens: call.max_tokens,
            temperature: call.temperature,
            system: call.system.as_deref(),
            messages: vec![MessagesMessage {
                role: "user",
                content: &call.prompt,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(&self.secret)
                .map_err(|e| GatewayError::Config(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static("2023-06-01"),
        );

        let url = format!("{}/messages", self.base_url);
        let response: MessagesResponse = self
            .http
            .post_json(&self.provider, &url, &body, headers)
            .await?;

        let content = response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Parse {
                provider: self.provider.clone(),
                message: "response carried no text block".to_string(),
            })?;

        let tokens_used = response
            .usage
            .map(|u| u.input_tokens + u.output_tokens)
            .unwrap_or(0);

        Ok(AdapterReply {
            content,
            model: response.model.unwrap_or_else(|| call.model.clone()),
            tokens_used,
        })
    }
}
