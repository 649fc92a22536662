//! Configuration for the retrieval engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Index construction.
    pub indexing: IndexingConfig,

    /// Query processing.
    pub search: SearchConfig,

    /// Result caching.
    pub cache: CacheConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,
}

impl RetrievalConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Set the indexing configuration.
    pub fn with_indexing(mut self, config: IndexingConfig) -> Self {
        self.indexing = config;
        self
    }

    /// Set the search configuration.
    pub fn with_search(mut self, config: SearchConfig) -> Self {
        self.search = config;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.indexing.batch_size == 0 {
            return Err(RetrievalError::Config("indexing.batch_size must be > 0".into()));
        }
        if self.indexing.concurrency == 0 {
            return Err(RetrievalError::Config("indexing.concurrency must be > 0".into()));
        }
        if !(-1.0..=1.0).contains(&self.search.min_similarity) {
            return Err(RetrievalError::Config(
                "search.min_similarity must lie within [-1, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.partial_sort_ratio) {
            return Err(RetrievalError::Config(
                "search.partial_sort_ratio must lie within [0, 1]".into(),
            ));
        }
        if self.search.default_limit == 0 {
            return Err(RetrievalError::Config("search.default_limit must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration for index construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Texts embedded per batch.
    pub batch_size: usize,

    /// Batches embedded concurrently.
    pub concurrency: usize,

    /// Pause between groups of concurrent batches (in milliseconds).
    pub batch_delay_ms: u64,

    /// Bound on a single provider call (in milliseconds).
    pub embed_timeout_ms: u64,

    /// Bound on waiting for the index before local strategies run (in
    /// milliseconds).
    pub init_timeout_ms: u64,
}

impl IndexingConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 3,
            batch_delay_ms: 100,
            embed_timeout_ms: 10_000,
            init_timeout_ms: 60_000,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results when a query sets no limit.
    pub default_limit: usize,

    /// Candidates at or below this cosine similarity are discarded.
    pub min_similarity: f32,

    /// Below this share of the candidate count, top-k uses the bounded
    /// insertion list instead of a full sort.
    pub partial_sort_ratio: f32,

    /// Bound on each strategy attempt (in milliseconds).
    pub strategy_timeout_ms: u64,

    /// Language assumed for queries that do not set one.
    pub default_language: String,
}

impl SearchConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_similarity: 0.1,
            partial_sort_ratio: 0.1,
            strategy_timeout_ms: 10_000,
            default_language: "ja".to_string(),
        }
    }
}

/// Configuration for the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether search results are cached.
    pub enabled: bool,

    /// Time-to-live of a cached result (in seconds).
    pub ttl_secs: u64,

    /// Maximum number of cached results.
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 1000,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Maximum number of cached vectors.
    pub cache_max_entries: Option<usize>,

    /// File the embedding cache is persisted to.
    pub cache_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: None,
            cache_max_entries: Some(10_000),
            cache_path: None,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// No embeddings (keyword-only search).
    None,
}
