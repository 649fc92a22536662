//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit or quota exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Provider temporarily unavailable.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The provider returned a vector that cannot be used for ranking.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether a later attempt with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Unavailable(_) | Self::Timeout { .. } | Self::Http(_)
        )
    }
}
