//! Cosine-similarity search over the item index.

use std::sync::Arc;

use sift_embeddings::{Scored, find_top_k};

use crate::config::SearchConfig;
use crate::index::IndexSnapshot;
use crate::item::Item;
use crate::query::Query;

/// Ranks embedded items by cosine similarity to a query vector.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    min_similarity: f32,
    partial_sort_ratio: f32,
}

impl SimilarityEngine {
    pub fn new(min_similarity: f32, partial_sort_ratio: f32) -> Self {
        Self {
            min_similarity,
            partial_sort_ratio,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.min_similarity, config.partial_sort_ratio)
    }

    /// The `limit` most similar embedded items accepted by `query`.
    ///
    /// Items without a vector never appear; ties keep index order.
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        query: &Query,
        query_embedding: &[f32],
        limit: usize,
    ) -> Vec<Scored<Arc<Item>>> {
        let candidates = snapshot
            .embedded()
            .filter(|(item, _)| query.accepts(item))
            .map(|(item, embedding)| (Arc::clone(item), embedding));

        find_top_k(
            query_embedding,
            candidates,
            limit,
            self.min_similarity,
            self.partial_sort_ratio,
        )
    }
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}
