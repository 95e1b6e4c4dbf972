//! HTTP Client
//!
//! One shared async client for every adapter. Retrying is deliberately not
//! done here: failed calls feed the circuit breaker and the fallback chain
//! instead of being retried against the same upstream.

use crate::error::{GatewayError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Shared HTTP client for provider calls
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST a JSON body and decode a JSON response.
    ///
    /// Non-success statuses are classified into the error taxonomy so the
    /// router can tell auth problems from upstream degradation.
    pub async fn post_json<T, R>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: HeaderMap,
    ) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let mut headers = headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| GatewayError::Parse {
                provider: provider.to_string(),
                message: format!("{}. Body: {}", e, truncate(&text, 500)),
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth {
                provider: provider.to_string(),
                message: text,
            });
        }

        Err(GatewayError::Upstream {
            provider: provider.to_string(),
            status: status.as_u16(),
            message: text,
        })
    }
}

/// First `max` characters of `s`, always cut on a char boundary
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
