//! Embedding provider implementations.
//!
//! Implements the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]**: returns configuration errors; used when
//!   embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible `/v1/embeddings`
//!   endpoint.
//!
//! # Request Policy
//!
//! One query, one request. There is no retry and no caching: a non-2xx
//! response fails the query with [`RagError::Provider`] carrying the raw
//! response body. Every request carries the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use scoped_rag_core::embedding::EmbeddingProvider;
use scoped_rag_core::error::{RagError, Result};

use crate::config::EmbeddingConfig;

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Configuration(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// Sends `{model, input}` to the configured URL with a bearer credential
/// and returns `data[0].embedding` unchanged.
pub struct OpenAIProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAIProvider {
    /// Create a provider, reading the credential from the environment
    /// variable named by `embedding.api_key_env`.
    ///
    /// A missing credential is not an error here; it is reported as
    /// [`RagError::Configuration`] by the first [`embed`](EmbeddingProvider::embed).
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit credential.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::Configuration("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            RagError::Configuration("embedding.dims required for OpenAI provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model,
            dims,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            RagError::Configuration(format!(
                "{} environment variable not set",
                self.api_key_env
            ))
        })?;

        debug!(model = %self.model, text_len = text.len(), "embedding query");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.url, error = %e, "embedding request failed");
                let body = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    format!("request failed: {e}")
                };
                RagError::Provider { status: None, body }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "embedding provider returned an error");
            return Err(RagError::Provider {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| RagError::Provider {
            status: Some(status.as_u16()),
            body: format!("failed to parse response: {e}"),
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::Provider {
                status: Some(status.as_u16()),
                body: "response contained no embeddings".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => Err(RagError::Configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}
