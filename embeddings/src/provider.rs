//! Embedding providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,

    /// Dimensions for the output (if supported by provider).
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Dimension of the embedding.
    pub dimension: usize,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

/// Trait for embedding providers.
///
/// Implementations may be slow and are called concurrently.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the default embedding dimension.
    fn default_dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// Provider used when no embedding backend is configured.
///
/// Every call fails with [`EmbeddingError::ProviderNotConfigured`], which
/// leaves items unembedded and routes queries to keyword search.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn default_model(&self) -> &str {
        ""
    }

    fn default_dimension(&self) -> usize {
        0
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        Err(EmbeddingError::ProviderNotConfigured)
    }

    fn is_available(&self) -> bool {
        false
    }
}

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Embeddings over the OpenAI HTTP API.
///
/// The key is read from `OPENAI_API_KEY`; without one the provider reports
/// itself unavailable and callers fall back to keyword search.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,

    /// Requested output size; models that support shortening honor it.
    dimensions: Option<usize>,

    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: OPENAI_API_BASE.to_string(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            dimensions: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point at an OpenAI-compatible server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask for vectors of `dimensions` components.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_dimension(&self) -> usize {
        self.dimensions.unwrap_or(match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let model = request.model.as_deref().unwrap_or(&self.model);
        let dimensions = request.dimensions.or(self.dimensions);
        let body = OpenAIEmbeddingRequest {
            input: &request.text,
            model,
            dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let parsed: OpenAIEmbeddingResponse = response.json().await?;
        let embedding = parsed
            .data
            .into_iter()
            .find(|entry| entry.index == 0)
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".into()))?;

        if let Some(expected) = dimensions {
            if embedding.len() != expected {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {expected} dimensions, got {}",
                    embedding.len()
                )));
            }
        }

        debug!(model = %parsed.model, dimension = embedding.len(), "Embedded text");

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: parsed.model,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map a non-success response onto the provider error classes.
///
/// 429 is a quota error, 5xx an outage; anything else is a rejected request.
async fn failure_from_response(response: reqwest::Response) -> EmbeddingError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return EmbeddingError::RateLimited { retry_after_secs };
    }

    if status.is_server_error() {
        return EmbeddingError::Unavailable(format!("status {status}"));
    }

    let detail = response
        .json::<OpenAIErrorBody>()
        .await
        .map(|body| body.error.message)
        .unwrap_or_default();
    EmbeddingError::ApiRequest(format!("status {status}: {detail}"))
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}
