//! Retrieval strategies tried in order by the engine.

use std::sync::Arc;

use async_trait::async_trait;
use sift_embeddings::CachedEmbedder;
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::index::ItemIndex;
use crate::item::Item;
use crate::query::Query;
use crate::result::SearchMethod;
use crate::source::{CloudVectorSearch, ContentSource};
use crate::text_search::TextSearchEngine;
use crate::vector_search::SimilarityEngine;

/// One link of the fallback chain.
///
/// An attempt succeeds when it returns a non-empty list. Errors and empty
/// lists both hand over to the next strategy.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    /// Method reported when this strategy serves a result.
    fn method(&self) -> SearchMethod;

    /// Whether the strategy reads the local index.
    fn uses_index(&self) -> bool {
        false
    }

    /// Return at most `limit` items for `query`.
    async fn attempt(&self, query: &Query, limit: usize) -> Result<Vec<Item>>;
}

/// Asks the remote catalog for items matching the query text.
pub struct DynamicStrategy {
    source: Option<Arc<dyn ContentSource>>,
}

impl DynamicStrategy {
    pub fn new(source: Option<Arc<dyn ContentSource>>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl RetrievalStrategy for DynamicStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Dynamic
    }

    async fn attempt(&self, query: &Query, limit: usize) -> Result<Vec<Item>> {
        let source = self
            .source
            .as_ref()
            .ok_or(RetrievalError::NotConfigured("dynamic content source"))?;

        let items = source.fetch_items(Some(&query.text)).await?;
        Ok(items
            .into_iter()
            .filter(|item| query.accepts(item))
            .take(limit)
            .collect())
    }
}

/// Delegates to a managed vector search backend.
pub struct CloudVectorStrategy {
    backend: Option<Arc<dyn CloudVectorSearch>>,
}

impl CloudVectorStrategy {
    pub fn new(backend: Option<Arc<dyn CloudVectorSearch>>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl RetrievalStrategy for CloudVectorStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Vertex
    }

    async fn attempt(&self, query: &Query, limit: usize) -> Result<Vec<Item>> {
        let backend = self
            .backend
            .as_ref()
            .filter(|b| b.is_configured())
            .ok_or(RetrievalError::NotConfigured("cloud vector search"))?;

        let items = backend.search(query, limit).await?;
        Ok(items
            .into_iter()
            .filter(|item| query.accepts(item))
            .take(limit)
            .collect())
    }
}

/// Cosine similarity over the local index.
pub struct LocalVectorStrategy {
    index: Arc<ItemIndex>,
    embedder: CachedEmbedder,
    engine: SimilarityEngine,
}

impl LocalVectorStrategy {
    pub fn new(index: Arc<ItemIndex>, embedder: CachedEmbedder, engine: SimilarityEngine) -> Self {
        Self {
            index,
            embedder,
            engine,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for LocalVectorStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Local
    }

    fn uses_index(&self) -> bool {
        true
    }

    async fn attempt(&self, query: &Query, limit: usize) -> Result<Vec<Item>> {
        let snapshot = self.index.snapshot().await;
        if snapshot.embedded_count() == 0 {
            debug!("No embedded items, skipping query embedding");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(&query.text).await?;
        Ok(self
            .engine
            .search(&snapshot, query, &query_embedding, limit)
            .into_iter()
            .map(|scored| Item::clone(&scored.value))
            .collect())
    }
}

/// Keyword scoring over the local index.
pub struct TextSearchStrategy {
    index: Arc<ItemIndex>,
    engine: TextSearchEngine,
}

impl TextSearchStrategy {
    pub fn new(index: Arc<ItemIndex>) -> Self {
        Self {
            index,
            engine: TextSearchEngine::new(),
        }
    }
}

#[async_trait]
impl RetrievalStrategy for TextSearchStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Text
    }

    fn uses_index(&self) -> bool {
        true
    }

    async fn attempt(&self, query: &Query, limit: usize) -> Result<Vec<Item>> {
        let snapshot = self.index.snapshot().await;
        Ok(self
            .engine
            .search(&snapshot, query, limit)
            .into_iter()
            .map(|scored| Item::clone(&scored.value))
            .collect())
    }
}

/// The canned answer served when every strategy came back empty.
///
/// Has no dependencies and cannot fail.
pub fn static_fallback_items(language: &str) -> Vec<Item> {
    let item = if language.trim().eq_ignore_ascii_case("en") {
        Item::new("fallback-no-results", "No matching information found")
            .with_description("We could not find information matching your request.")
            .with_content(
                "Please try different keywords, or contact the help desk for assistance.",
            )
            .with_language("en")
    } else {
        Item::new("fallback-no-results", "該当する情報が見つかりませんでした")
            .with_description("ご質問に一致する情報を見つけることができませんでした。")
            .with_content("別のキーワードでお試しいただくか、窓口までお問い合わせください。")
            .with_language("ja")
    };

    vec![
        item.with_category("general")
            .with_tag("fallback")
            .with_source("static"),
    ]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use sift_embeddings::{DisabledProvider, EmbeddingCache};

    use super::*;
    use crate::index::IndexSnapshot;
    use crate::source::StaticContentSource;

    struct UnconfiguredCloud;

    #[async_trait]
    impl CloudVectorSearch for UnconfiguredCloud {
        fn is_configured(&self) -> bool {
            false
        }

        async fn search(&self, _query: &Query, _limit: usize) -> Result<Vec<Item>> {
            Err(RetrievalError::Network("must not be called".to_string()))
        }
    }

    #[tokio::test]
    async fn test_missing_collaborators_report_configuration_errors() {
        let query = Query::new("保育園", "ja");

        let err = DynamicStrategy::new(None).attempt(&query, 5).await.unwrap_err();
        assert!(err.is_configuration());

        let err = CloudVectorStrategy::new(Some(Arc::new(UnconfiguredCloud)))
            .attempt(&query, 5)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_dynamic_strategy_applies_filters_and_limit() {
        let source = StaticContentSource::new(vec![
            Item::new("1", "保育園A").with_category("childcare"),
            Item::new("2", "保育園B").with_category("childcare"),
            Item::new("3", "保育園C").with_category("other"),
        ]);
        let strategy = DynamicStrategy::new(Some(Arc::new(source)));
        let query = Query::new("保育園", "ja").with_category("childcare");

        let items = strategy.attempt(&query, 1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "1");
    }

    #[tokio::test]
    async fn test_local_vector_skips_embedding_without_vectors() {
        let index = Arc::new(ItemIndex::new());
        let mut snapshot = IndexSnapshot::new();
        snapshot.insert(Item::new("1", "t"), None);
        index.publish(snapshot).await;

        // The disabled provider would fail; an unembedded index never asks.
        let embedder = CachedEmbedder::new(
            Arc::new(DisabledProvider),
            Arc::new(EmbeddingCache::new()),
            Duration::from_secs(1),
        );
        let strategy = LocalVectorStrategy::new(index, embedder, SimilarityEngine::default());

        let items = strategy.attempt(&Query::new("q", "ja"), 5).await.unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_static_fallback_is_localized() {
        let ja = static_fallback_items("ja");
        let en = static_fallback_items("EN");

        assert_eq!(ja.len(), 1);
        assert_eq!(ja[0].metadata.language, "ja");
        assert_eq!(en[0].title, "No matching information found");
    }
}
