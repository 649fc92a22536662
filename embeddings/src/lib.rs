//! # Embeddings
//!
//! Embedding generation, caching and similarity ranking for sift retrieval.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through an
//!   [`EmbeddingProvider`]
//! - **Caching**: Vectors memoized by the hash of the embedded text
//! - **Similarity Search**: Cosine similarity with pluggable top-k selection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► CachedEmbedder ──► EmbeddingCache       │
//! │       │                    │                                    │
//! │       ▼                    ▼                                    │
//! │  OpenAI/Disabled     cosine_similarity ──► TopKSelection        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedEmbedder, EmbeddingCache, EmbeddingSource, content_hash};
pub use error::{EmbeddingError, Result};
pub use provider::{
    DisabledProvider, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider,
};
pub use similarity::{Scored, TopKSelection, cosine_similarity, find_top_k, validate_embedding};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
