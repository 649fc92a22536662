//! Error types for the retrieval engine.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// None of these reach callers of [`crate::RetrievalEngine::search`]; they
/// surface from collaborators and administrative operations and are
/// turned into fallthroughs by the strategy chain.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] sift_embeddings::EmbeddingError),

    /// A remote collaborator could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// A remote collaborator answered with an error.
    #[error("source error: {0}")]
    Source(String),

    /// An operation exceeded its time bound.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// A strategy or collaborator is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// Failure of a deduplicated operation, shared by every awaiter.
    #[error(transparent)]
    Shared(Arc<RetrievalError>),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether this error only reports a missing configuration.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::NotConfigured(_) | Self::Config(_) => true,
            Self::Embedding(e) => {
                matches!(e, sift_embeddings::EmbeddingError::ProviderNotConfigured)
            }
            Self::Shared(inner) => inner.is_configuration(),
            _ => false,
        }
    }

    /// Whether this error reports an exceeded time bound.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Embedding(e) => matches!(e, sift_embeddings::EmbeddingError::Timeout { .. }),
            Self::Shared(inner) => inner.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_embeddings::EmbeddingError;

    #[test]
    fn test_configuration_classification() {
        assert!(RetrievalError::NotConfigured("cloud vector search").is_configuration());
        assert!(RetrievalError::from(EmbeddingError::ProviderNotConfigured).is_configuration());
        assert!(!RetrievalError::Network("connection refused".to_string()).is_configuration());

        let shared = RetrievalError::Shared(Arc::new(RetrievalError::NotConfigured("x")));
        assert!(shared.is_configuration());
    }

    #[test]
    fn test_timeout_classification() {
        let err = RetrievalError::Timeout {
            operation: "dynamic search",
            timeout_ms: 20,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "dynamic search timed out after 20ms");
        assert!(RetrievalError::from(EmbeddingError::Timeout { timeout_ms: 5 }).is_timeout());
    }
}
