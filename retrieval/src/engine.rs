//! The retrieval engine: result cache in front of an ordered strategy chain.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sift_embeddings::{
    CachedEmbedder, DisabledProvider, EmbeddingCache, EmbeddingProvider, OpenAIProvider,
};
use tracing::{debug, info, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig};
use crate::error::{Result, RetrievalError};
use crate::index::ItemIndex;
use crate::indexer::{IndexReport, Indexer};
use crate::item::Item;
use crate::query::Query;
use crate::result::{SearchMethod, SearchResult};
use crate::result_cache::ResultCache;
use crate::source::{CloudVectorSearch, ContentSource, StaticContentSource};
use crate::strategy::{
    CloudVectorStrategy, DynamicStrategy, LocalVectorStrategy, RetrievalStrategy,
    TextSearchStrategy, static_fallback_items,
};
use crate::vector_search::SimilarityEngine;

/// Answers queries with the best available strategy.
///
/// Strategies are tried in order: remote catalog, cloud vector search, local
/// vector search, keyword search. The first non-empty answer wins and is
/// cached. When all of them come back empty or fail, a canned answer is
/// returned, so [`RetrievalEngine::search`] never fails.
pub struct RetrievalEngine {
    config: RetrievalConfig,

    index: Arc<ItemIndex>,

    indexer: Indexer,

    embedder: CachedEmbedder,

    result_cache: ResultCache,

    /// The fallback chain, in priority order.
    strategies: Vec<Box<dyn RetrievalStrategy>>,
}

impl RetrievalEngine {
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::new()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Answer `query`.
    pub async fn search(&self, query: &Query) -> SearchResult {
        let start = Instant::now();
        let limit = query.limit_or(self.config.search.default_limit).max(1);
        let fingerprint = query.fingerprint(self.config.search.default_limit);
        let prefix = query.log_prefix();

        if self.config.cache.enabled {
            if let Some(cached) = self.result_cache.get(&fingerprint).await {
                debug!(query = %prefix, "Result cache hit");
                return cached.served_from_cache(&query.text, start.elapsed());
            }
        }

        let mut errored = false;
        let mut index_checked = false;

        for strategy in &self.strategies {
            let method = strategy.method();

            if strategy.uses_index() && !index_checked {
                index_checked = true;
                if let Err(err) = self.wait_for_index().await {
                    if err.is_configuration() {
                        debug!(query = %prefix, "Index unavailable: {err}");
                    } else {
                        warn!(
                            query = %prefix,
                            "Index unavailable, searching what is loaded: {err}"
                        );
                        errored = true;
                    }
                }
            }

            let timeout = self.config.search.strategy_timeout();
            let outcome = tokio::time::timeout(timeout, strategy.attempt(query, limit))
                .await
                .unwrap_or_else(|_| {
                    Err(RetrievalError::Timeout {
                        operation: method.as_str(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                });

            match outcome {
                Ok(items) if !items.is_empty() => {
                    let result = SearchResult::new(&query.text, items, method, start.elapsed());
                    info!(
                        strategy = %method,
                        query = %prefix,
                        total = result.total,
                        elapsed_ms = result.processing_time.as_millis() as u64,
                        "Search answered"
                    );
                    if self.config.cache.enabled {
                        self.result_cache
                            .set(fingerprint, result.clone(), self.config.cache.ttl())
                            .await;
                    }
                    return result;
                }
                Ok(_) => debug!(strategy = %method, query = %prefix, "Strategy returned no items"),
                Err(err) if err.is_configuration() => {
                    debug!(strategy = %method, query = %prefix, "Strategy not configured: {err}");
                }
                Err(err) => {
                    warn!(strategy = %method, query = %prefix, "Strategy failed: {err}");
                    errored = true;
                }
            }
        }

        let method = if errored {
            SearchMethod::ErrorFallback
        } else {
            SearchMethod::BasicFallback
        };
        let language = if query.language.trim().is_empty() {
            self.config.search.default_language.as_str()
        } else {
            query.language.as_str()
        };
        info!(strategy = %method, query = %prefix, "Serving static fallback");
        SearchResult::new(
            &query.text,
            static_fallback_items(language),
            method,
            start.elapsed(),
        )
    }

    /// Build the index from the content source unless already built.
    pub async fn initialize(&self) -> Result<IndexReport> {
        self.indexer.ensure_initialized().await
    }

    /// Rebuild the index from the content source and drop cached results.
    ///
    /// Joins a build already in flight rather than starting a second one.
    pub async fn reinitialize_index(&self) -> Result<IndexReport> {
        let report = self.indexer.rebuild().await?;
        self.result_cache.clear().await;
        Ok(report)
    }

    /// Replace the index with `items` and drop cached results.
    pub async fn index_items(&self, items: Vec<Item>) -> Result<IndexReport> {
        let report = self.indexer.build(items).await?;
        self.result_cache.clear().await;
        Ok(report)
    }

    /// Drop every cached search result.
    pub async fn invalidate_cache(&self) {
        self.result_cache.clear().await;
    }

    pub async fn stats(&self) -> EngineStats {
        self.result_cache.purge_expired().await;
        let snapshot = self.index.snapshot().await;
        EngineStats {
            total_items: snapshot.len(),
            items_with_embeddings: snapshot.embedded_count(),
            cache_size: self.result_cache.len().await,
            embedding_cache_entries: self.embedder.cache().len().await,
            is_initialized: self.indexer.is_initialized(),
            last_build: self.indexer.last_report(),
        }
    }

    async fn wait_for_index(&self) -> Result<IndexReport> {
        let timeout = self.config.indexing.init_timeout();
        tokio::time::timeout(timeout, self.indexer.ensure_initialized())
            .await
            .map_err(|_| RetrievalError::Timeout {
                operation: "index initialization",
                timeout_ms: timeout.as_millis() as u64,
            })?
    }
}

/// Builder for [`RetrievalEngine`].
pub struct RetrievalEngineBuilder {
    config: RetrievalConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    embedding_cache: Option<Arc<EmbeddingCache>>,
    content_source: Option<Arc<dyn ContentSource>>,
    dynamic_source: Option<Arc<dyn ContentSource>>,
    cloud_search: Option<Arc<dyn CloudVectorSearch>>,
}

impl RetrievalEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
            provider: None,
            embedding_cache: None,
            content_source: None,
            dynamic_source: None,
            cloud_search: None,
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `provider` instead of the one named by the configuration.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Share an existing embedding cache.
    pub fn with_embedding_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.embedding_cache = Some(cache);
        self
    }

    /// Catalog the index is built from. Defaults to an empty catalog.
    pub fn with_content_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content_source = Some(source);
        self
    }

    /// Remote catalog queried first with the request text.
    pub fn with_dynamic_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.dynamic_source = Some(source);
        self
    }

    pub fn with_cloud_search(mut self, backend: Arc<dyn CloudVectorSearch>) -> Self {
        self.cloud_search = Some(backend);
        self
    }

    /// Build the engine. The index is built lazily on the first search
    /// that needs it, or eagerly through [`RetrievalEngine::initialize`].
    pub async fn build(self) -> Result<RetrievalEngine> {
        let config = self.config;
        config.validate()?;

        let provider = self
            .provider
            .unwrap_or_else(|| provider_from_config(&config.embedding));
        let cache = match self.embedding_cache {
            Some(cache) => cache,
            None => Arc::new(embedding_cache_from_config(&config.embedding).await?),
        };
        let embedder = CachedEmbedder::new(provider, cache, config.indexing.embed_timeout());

        let index = Arc::new(ItemIndex::new());
        let source = self
            .content_source
            .unwrap_or_else(|| Arc::new(StaticContentSource::default()));
        let indexer = Indexer::new(
            Arc::clone(&index),
            embedder.clone(),
            source,
            config.indexing.clone(),
        );

        let strategies: Vec<Box<dyn RetrievalStrategy>> = vec![
            Box::new(DynamicStrategy::new(self.dynamic_source)),
            Box::new(CloudVectorStrategy::new(self.cloud_search)),
            Box::new(LocalVectorStrategy::new(
                Arc::clone(&index),
                embedder.clone(),
                SimilarityEngine::from_config(&config.search),
            )),
            Box::new(TextSearchStrategy::new(Arc::clone(&index))),
        ];

        info!(
            provider = embedder.provider().name(),
            strategies = strategies.len(),
            "Retrieval engine ready"
        );

        Ok(RetrievalEngine {
            result_cache: ResultCache::new(config.cache.max_entries),
            config,
            index,
            indexer,
            embedder,
            strategies,
        })
    }
}

impl Default for RetrievalEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn provider_from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderType::OpenAI => {
            let provider = match &config.model {
                Some(model) => OpenAIProvider::new().with_model(model),
                None => OpenAIProvider::new(),
            };
            if !provider.is_available() {
                warn!("OPENAI_API_KEY not set, vector search disabled");
            }
            Arc::new(provider)
        }
        EmbeddingProviderType::None => Arc::new(DisabledProvider),
    }
}

async fn embedding_cache_from_config(config: &EmbeddingConfig) -> Result<EmbeddingCache> {
    let cache = match (&config.cache_path, config.cache_max_entries) {
        (Some(path), max_entries) => EmbeddingCache::with_persistence(path, max_entries).await?,
        (None, Some(max_entries)) => EmbeddingCache::bounded(max_entries),
        (None, None) => EmbeddingCache::new(),
    };
    Ok(cache)
}

/// Statistics about the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Items in the index.
    pub total_items: usize,

    /// Items carrying a vector.
    pub items_with_embeddings: usize,

    /// Cached search results.
    pub cache_size: usize,

    /// Cached embedding vectors.
    pub embedding_cache_entries: usize,

    /// Whether an index build has completed.
    pub is_initialized: bool,

    /// Report of the most recent build.
    pub last_build: Option<IndexReport>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::{CacheConfig, SearchConfig};

    struct FailingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_items(&self, _query: Option<&str>) -> Result<Vec<Item>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RetrievalError::Network("connection refused".to_string()))
        }
    }

    struct SlowCloud;

    #[async_trait]
    impl CloudVectorSearch for SlowCloud {
        async fn search(&self, _query: &Query, _limit: usize) -> Result<Vec<Item>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![Item::new("late", "too late")])
        }
    }

    fn keyword_config() -> RetrievalConfig {
        let mut config = RetrievalConfig::default();
        config.embedding.provider = EmbeddingProviderType::None;
        config
    }

    fn park_items() -> Vec<Item> {
        vec![
            Item::new("library", "市立図書館").with_tag("施設"),
            Item::new("park", "中央公園").with_tag("施設"),
        ]
    }

    #[tokio::test]
    async fn test_builder_with_disabled_provider() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .build()
            .await
            .unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.total_items, 0);
        assert!(!stats.is_initialized);
        assert_eq!(engine.embedder.provider().name(), "disabled");
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let mut config = keyword_config();
        config.indexing.batch_size = 0;

        let err = RetrievalEngine::builder()
            .with_config(config)
            .build()
            .await
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_search_builds_index_lazily() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .with_content_source(Arc::new(StaticContentSource::new(park_items())))
            .build()
            .await
            .unwrap();

        let result = engine.search(&Query::new("公園", "ja")).await;

        assert_eq!(result.search_method, SearchMethod::Text);
        assert_eq!(result.items[0].id, "park");
        let stats = engine.stats().await;
        assert!(stats.is_initialized);
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.items_with_embeddings, 0);
        assert_eq!(stats.cache_size, 1);
    }

    #[tokio::test]
    async fn test_index_items_clears_result_cache() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .build()
            .await
            .unwrap();
        engine.index_items(park_items()).await.unwrap();

        let query = Query::new("図書館", "ja");
        assert!(!engine.search(&query).await.used_cache);
        assert!(engine.search(&query).await.used_cache);

        engine
            .index_items(vec![Item::new("new-library", "新しい図書館")])
            .await
            .unwrap();

        let result = engine.search(&query).await;
        assert!(!result.used_cache);
        assert_eq!(result.items[0].id, "new-library");
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let config = keyword_config().with_cache(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let engine = RetrievalEngine::builder()
            .with_config(config)
            .build()
            .await
            .unwrap();
        engine.index_items(park_items()).await.unwrap();

        let query = Query::new("公園", "ja");
        engine.search(&query).await;
        assert!(!engine.search(&query).await.used_cache);
        assert_eq!(engine.stats().await.cache_size, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_reports_current_query_text() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .build()
            .await
            .unwrap();
        engine.index_items(park_items()).await.unwrap();

        engine.search(&Query::new("  公園 ", "ja")).await;
        let hit = engine.search(&Query::new("公園", "ja")).await;

        assert!(hit.used_cache);
        assert_eq!(hit.query, "公園");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_skip_expired_results() {
        let config = keyword_config().with_cache(CacheConfig {
            ttl_secs: 1,
            ..CacheConfig::default()
        });
        let engine = RetrievalEngine::builder()
            .with_config(config)
            .build()
            .await
            .unwrap();
        engine.index_items(park_items()).await.unwrap();

        engine.search(&Query::new("公園", "ja")).await;
        assert_eq!(engine.stats().await.cache_size, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(engine.stats().await.cache_size, 0);
    }

    #[tokio::test]
    async fn test_items_indexed_during_lazy_build_are_kept() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .build()
            .await
            .unwrap();

        let query = Query::new("公園", "ja");
        let (_, report) = tokio::join!(engine.search(&query), engine.index_items(park_items()));

        assert_eq!(report.unwrap().total_items, 2);
        let result = engine.search(&query).await;
        assert_eq!(result.search_method, SearchMethod::Text);
        assert_eq!(result.items[0].id, "park");
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .build()
            .await
            .unwrap();

        let query = Query::new("存在しない", "en");
        let first = engine.search(&query).await;
        let second = engine.search(&query).await;

        assert_eq!(first.search_method, SearchMethod::BasicFallback);
        assert_eq!(first.items[0].metadata.language, "en");
        assert!(!second.used_cache);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_strategy_is_logged_and_reported() {
        let source = Arc::new(FailingSource {
            calls: AtomicUsize::new(0),
        });
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .with_dynamic_source(source.clone())
            .build()
            .await
            .unwrap();

        let result = engine.search(&Query::new("保育園の申し込み", "ja")).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.search_method, SearchMethod::ErrorFallback);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.items.len(), 1);
        assert!(logs_contain("Strategy failed"));
        assert!(logs_contain("connection refused"));
        assert!(logs_contain("保育園の申し込み"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_strategy_times_out() {
        let config = keyword_config().with_search(SearchConfig {
            strategy_timeout_ms: 50,
            ..SearchConfig::default()
        });
        let engine = RetrievalEngine::builder()
            .with_config(config)
            .with_cloud_search(Arc::new(SlowCloud))
            .build()
            .await
            .unwrap();
        engine.index_items(park_items()).await.unwrap();

        let result = engine.search(&Query::new("公園", "ja")).await;

        assert_eq!(result.search_method, SearchMethod::Text);
        assert_eq!(result.items[0].id, "park");
    }

    #[tokio::test]
    async fn test_failed_source_fetch_degrades_to_fallback() {
        let source = Arc::new(FailingSource {
            calls: AtomicUsize::new(0),
        });
        let engine = RetrievalEngine::builder()
            .with_config(keyword_config())
            .with_content_source(source)
            .build()
            .await
            .unwrap();

        let result = engine.search(&Query::new("公園", "")).await;

        assert_eq!(result.search_method, SearchMethod::ErrorFallback);
        assert_eq!(result.items[0].metadata.language, "ja");
        assert!(!engine.stats().await.is_initialized);
    }
}
