//! # Retrieval Engine
//!
//! Semantic retrieval over a catalog of content items:
//!
//! - **Index**: items embedded in deduplicated, batched builds
//! - **Strategies**: remote catalog, cloud vectors, local vectors, keywords
//! - **Result Cache**: fingerprinted answers with a time-to-live
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       RetrievalEngine                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   Query ──► ResultCache ──hit──────────────────────► Result     │
//! │                 │ miss                                          │
//! │                 ▼                                               │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐        │
//! │   │ Dynamic  │─►│  Cloud   │─►│  Local   │─►│   Text   │──┐     │
//! │   │  source  │  │  vector  │  │  vector  │  │  search  │  │     │
//! │   └──────────┘  └──────────┘  └──────────┘  └──────────┘  │     │
//! │                                    │             │        ▼     │
//! │                                    └──ItemIndex──┘   Static     │
//! │                                          ▲          fallback    │
//! │                                       Indexer                   │
//! │                                          ▲                      │
//! │                                    ContentSource                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sift_retrieval::{Query, RetrievalEngine, StaticContentSource};
//!
//! let engine = RetrievalEngine::builder()
//!     .with_content_source(Arc::new(StaticContentSource::new(items)))
//!     .build()
//!     .await?;
//!
//! let result = engine.search(&Query::new("保育園", "ja")).await;
//! println!("{} via {}", result.total, result.search_method);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod item;
pub mod query;
pub mod result;
pub mod result_cache;
pub mod source;
pub mod strategy;
pub mod text_search;
pub mod vector_search;

pub use config::{
    CacheConfig, EmbeddingConfig, EmbeddingProviderType, IndexingConfig, RetrievalConfig,
    SearchConfig,
};
pub use engine::{EngineStats, RetrievalEngine, RetrievalEngineBuilder};
pub use error::{Result, RetrievalError};
pub use index::{EmbeddingStatus, IndexEntry, IndexSnapshot, ItemIndex};
pub use indexer::{IndexReport, Indexer};
pub use item::{Item, ItemMetadata};
pub use query::{Query, QueryFilters};
pub use result::{SearchMethod, SearchResult};
pub use result_cache::ResultCache;
pub use source::{CloudVectorSearch, ContentSource, StaticContentSource};
pub use strategy::RetrievalStrategy;
pub use text_search::TextSearchEngine;
pub use vector_search::SimilarityEngine;

// Re-export from dependencies for convenience
pub use sift_embeddings::{EmbeddingCache, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
