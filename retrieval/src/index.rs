//! In-memory item index.
//!
//! Readers take a cheap [`Arc`] to the current [`IndexSnapshot`]; the
//! indexer assembles a complete replacement off to the side and swaps it in
//! with [`ItemIndex::publish`], so nobody observes a half-built index.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::item::Item;

/// Embedding outcome recorded for each indexed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmbeddingStatus {
    /// The item carries a complete vector.
    Embedded,
    /// Embedding failed; the item is only reachable through keyword search.
    Unembeddable { reason: String },
}

/// An item together with its embedding outcome.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub item: Arc<Item>,
    pub status: EmbeddingStatus,
}

/// An immutable view of the index, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    entries: IndexMap<String, IndexEntry>,
}

impl IndexSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, replacing any entry with the same id in place.
    ///
    /// The status is derived from the item: an attached vector means
    /// embedded, otherwise `failure` (or a generic reason) is recorded.
    pub fn insert(&mut self, item: Item, failure: Option<String>) {
        let status = if item.has_embedding() {
            EmbeddingStatus::Embedded
        } else {
            EmbeddingStatus::Unembeddable {
                reason: failure.unwrap_or_else(|| "no embedding attached".to_string()),
            }
        };
        let entry = IndexEntry {
            item: Arc::new(item),
            status,
        };
        self.entries.insert(entry.item.id.clone(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of items carrying a vector.
    pub fn embedded_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == EmbeddingStatus::Embedded)
            .count()
    }

    /// All items, in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.entries.values().map(|e| &e.item)
    }

    /// Items with their vectors, in insertion order.
    pub fn embedded(&self) -> impl Iterator<Item = (&Arc<Item>, &[f32])> {
        self.entries
            .values()
            .filter_map(|e| e.item.embedding.as_deref().map(|v| (&e.item, v)))
    }
}

/// The shared, swappable index.
#[derive(Debug, Default)]
pub struct ItemIndex {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl ItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current complete snapshot.
    pub async fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.read().await.clone()
    }

    /// Replace the current snapshot.
    pub async fn publish(&self, snapshot: IndexSnapshot) {
        let len = snapshot.len();
        *self.current.write().await = Arc::new(snapshot);
        debug!("Published index snapshot with {len} items");
    }
}
