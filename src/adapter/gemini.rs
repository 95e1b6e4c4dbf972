//! Google Gemini Adapter
//!
//! The key travels as a query parameter and the model is part of the path.

use crate::adapter::{AdapterCall, AdapterReply, ProviderAdapter};
use crate::client::HttpClient;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

pub struct GeminiAdapter {
    provider: String,
    base_url: String,
    secret: String,
    http: HttpClient,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

impl GeminiAdapter {
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
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, call: &AdapterCall) -> Result<AdapterReply> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &call.prompt }],
            }],
            system_instruction: call.system.as_deref().map(|system| Content {
                parts: vec![Part { text: system }],
            }),
            generation_config: GenerationConfig {
                temperature: call.temperature,
                max_output_tokens: call.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, call.model, self.secret
        );
        let response: GenerateResponse = self
            .http
            .post_json(&self.provider, &url, &body, HeaderMap::new())
            .await?;

        let content = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Parse {
                provider: self.provider.clone(),
                message: "response carried no candidate text".to_string(),
            })?;

        Ok(AdapterReply {
            content,
            model: call.model.clone(),
            tokens_used: response
                .usage_metadata
                .map(|u| u.total_token_count)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_generate_uses_key_query_param() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent?key=g-key")
            .with_status(200)
            .with_body(
                r#"{
                    "candidates": [{"content": {"parts": [{"text": "4"}]}}],
                    "usageMetadata": {"totalTokenCount": 12}
                }"#,
            )
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(
            "gemini",
            &server.url(),
            "g-key",
            HttpClient::new(Duration::from_secs(5)).unwrap(),
        );

        let reply = adapter
            .generate(&AdapterCall {
                prompt: "2+2?".to_string(),
                system: None,
                temperature: 0.2,
                max_tokens: 64,
                model: "gemini-2.0-flash".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(reply.content, "4");
        assert_eq!(reply.tokens_used, 12);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_candidates_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent?key=g-key")
            .with_status(200)
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(
            "gemini",
            &server.url(),
            "g-key",
            HttpClient::new(Duration::from_secs(5)).unwrap(),
        );

        let err = adapter
            .generate(&AdapterCall {
                prompt: "2+2?".to_string(),
                system: None,
                temperature: 0.2,
                max_tokens: 64,
                model: "gemini-2.0-flash".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Parse { .. }));
    }
}
