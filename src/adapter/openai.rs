//! OpenAI-Compatible Adapter
//!
//! Speaks the chat-completions dialect shared by OpenAI, Groq, Mistral and
//! OpenRouter.

use crate::adapter::{AdapterCall, AdapterReply, ProviderAdapter};
use crate::client::HttpClient;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

pub struct OpenAiAdapter {
    provider: String,
    base_url: String,
    secret: String,
    http: HttpClient,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiAdapter {
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
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, call: &AdapterCall) -> Result<AdapterReply> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &call.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &call.prompt,
        });

        let body = ChatRequest {
            model: &call.model,
            messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.secret)).map_err(|e| {
                GatewayError::Config(format!("Invalid API key format: {}", e))
            })?,
        );

        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse = self
            .http
            .post_json(&self.provider, &url, &body, headers)
            .await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Parse {
                provider: self.provider.clone(),
                message: "response carried no message content".to_string(),
            })?;

        Ok(AdapterReply {
            content,
            model: response.model.unwrap_or_else(|| call.model.clone()),
            tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn call() -> AdapterCall {
        AdapterCall {
            prompt: "2+2?".to_string(),
            system: Some("You are terse.".to_string()),
            temperature: 0.2,
            max_tokens: 64,
            model: "llama-3.3-70b-versatile".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_extracts_content_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(
                r#"{
                    "model": "llama-3.3-70b-versatile",
                    "choices": [{"message": {"role": "assistant", "content": "4"}}],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
                }"#,
            )
            .create_async()
            .await;

        let adapter = OpenAiAdapter::new(
            "groq",
            &server.url(),
            "sk-test",
            HttpClient::new(Duration::from_secs(5)).unwrap(),
        );

        let reply = adapter.generate(&call()).await.unwrap();
        assert_eq!(reply.content, "4");
        assert_eq!(reply.tokens_used, 10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let adapter = OpenAiAdapter::new(
            "groq",
            &server.url(),
            "sk-test",
            HttpClient::new(Duration::from_secs(5)).unwrap(),
        );

        let err = adapter.generate(&call()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Parse { .. }));
    }
}
