//! Mock collaborators shared by the scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sift_retrieval::{
    CloudVectorSearch, ContentSource, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    EmbeddingProviderType, Item, Query, RetrievalConfig, RetrievalError,
};

/// Terms the mock embedder recognizes, one dimension each.
const VOCABULARY: &[&str] = &[
    "保育園", "公園", "施設", "図書館", "ごみ", "税金", "病院", "駅", "学校", "祭り",
];

/// Embeds texts as keyword-presence vectors over [`VOCABULARY`] and counts
/// every call.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    delay: Duration,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-mock"
    }

    fn default_model(&self) -> &str {
        "keyword-mock"
    }

    fn default_dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> sift_embeddings::Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut embedding: Vec<f32> = VOCABULARY
            .iter()
            .map(|term| if request.text.contains(term) { 1.0 } else { 0.0 })
            .collect();
        // Keeps texts without known terms away from the zero vector.
        embedding.push(0.05);

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "keyword-mock".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// A remote catalog that always fails.
pub struct BrokenSource {
    calls: AtomicUsize,
}

impl BrokenSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch_items(&self, _query: Option<&str>) -> sift_retrieval::Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RetrievalError::Network("catalog unreachable".to_string()))
    }
}

/// A remote catalog answering every query with the same items.
pub struct CountingSource {
    items: Vec<Item>,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            items,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch_items(&self, _query: Option<&str>) -> sift_retrieval::Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
}

/// A configured cloud backend that always fails.
pub struct BrokenCloud;

#[async_trait]
impl CloudVectorSearch for BrokenCloud {
    async fn search(&self, _query: &Query, _limit: usize) -> sift_retrieval::Result<Vec<Item>> {
        Err(RetrievalError::Source("index endpoint returned 500".to_string()))
    }
}

/// Defaults with no pause between batch groups.
pub fn fast_config() -> RetrievalConfig {
    let mut config = RetrievalConfig::default();
    config.indexing.batch_delay_ms = 0;
    config
}

/// Defaults with embeddings switched off.
pub fn keyword_only_config() -> RetrievalConfig {
    let mut config = fast_config();
    config.embedding.provider = EmbeddingProviderType::None;
    config
}

/// One childcare item among nine unrelated ones.
pub fn city_catalog() -> Vec<Item> {
    let unrelated = [
        ("library", "市立図書館の開館時間", "library"),
        ("garbage", "ごみの分別と収集日", "environment"),
        ("tax", "住民税の納付方法", "tax"),
        ("hospital", "夜間休日の救急病院", "health"),
        ("station", "駅前駐輪場の利用案内", "transport"),
        ("school", "小学校の入学手続き", "education"),
        ("festival", "夏祭りの開催案内", "events"),
        ("park", "中央公園の利用案内", "parks"),
        ("sports", "市民体育館の予約", "sports"),
    ];

    let mut items = vec![
        Item::new("nursery", "保育園の入園申し込み")
            .with_description("市内の保育園への入園手続き")
            .with_content("保育園の申し込みは毎年4月に受け付けています。")
            .with_category("childcare")
            .with_tag("保育園")
            .with_source("catalog"),
    ];
    items.extend(unrelated.iter().map(|(id, title, category)| {
        Item::new(*id, *title)
            .with_category(*category)
            .with_source("catalog")
    }));
    items
}

/// Items numbered `item-0` and up, with distinct texts.
pub fn numbered_items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| Item::new(format!("item-{i}"), format!("お知らせ {i}")))
        .collect()
}
