//! Keyword scoring over the item index.
//!
//! Used when no query embedding is available. Each query term found in an
//! item's title, description, content or tags scores 1, a term found in the
//! title scores 2 more, and a term found in any tag scores 1 more.

use std::sync::Arc;

use sift_embeddings::{Scored, TopKSelection};

use crate::index::IndexSnapshot;
use crate::item::Item;
use crate::query::Query;

const TERM_SCORE: u32 = 1;
const TITLE_BONUS: u32 = 2;
const TAG_BONUS: u32 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextSearchEngine;

impl TextSearchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Items matching at least one term of `query`, best first.
    ///
    /// Ties keep index order.
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        query: &Query,
        limit: usize,
    ) -> Vec<Scored<Arc<Item>>> {
        let terms = terms(&query.text);
        if terms.is_empty() {
            return Vec::new();
        }

        let scored: Vec<Scored<Arc<Item>>> = snapshot
            .items()
            .filter(|item| query.accepts(item))
            .filter_map(|item| {
                let score = score_item(item, &terms);
                (score > 0).then(|| Scored::new(Arc::clone(item), score as f32))
            })
            .collect();

        TopKSelection::FullSort.select(scored, limit)
    }
}

/// Distinct lowercase terms of `text`, in order of appearance.
fn terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in text.split_whitespace().map(str::to_lowercase) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn score_item(item: &Item, terms: &[String]) -> u32 {
    let haystack = item.searchable_text();
    let title = item.title.to_lowercase();
    let tags: Vec<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();

    terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .map(|term| {
            let mut score = TERM_SCORE;
            if title.contains(term.as_str()) {
                score += TITLE_BONUS;
            }
            if tags.iter().any(|tag| tag.contains(term.as_str())) {
                score += TAG_BONUS;
            }
            score
        })
        .sum()
}
