//! Similarity computation and top-k selection for embeddings.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// Mismatched lengths, empty or all-zero vectors yield 0.0. The result is
/// never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (magnitude_a * magnitude_b);
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Reject vectors that could not take part in ranking.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(EmbeddingError::InvalidEmbedding(
            "provider returned an empty vector".to_string(),
        ));
    }
    if let Some(position) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(EmbeddingError::InvalidEmbedding(format!(
            "non-finite component at position {position}"
        )));
    }
    Ok(())
}

/// A candidate paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scored<T> {
    /// The ranked value.
    pub value: T,

    /// Similarity score.
    pub score: f32,
}

impl<T> Scored<T> {
    /// Pair a value with its score.
    pub fn new(value: T, score: f32) -> Self {
        Self { value, score }
    }
}

fn descending<T>(a: &Scored<T>, b: &Scored<T>) -> Ordering {
    OrderedFloat(b.score).cmp(&OrderedFloat(a.score))
}

/// How the k best candidates are picked out of a candidate list.
///
/// Both selections produce the same sequence: descending by score, with
/// equal scores kept in encounter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopKSelection {
    /// Keep a sorted list of at most k entries and insert each candidate
    /// that beats the current worst.
    BoundedInsertion,

    /// Stable sort of every candidate, then truncate.
    FullSort,
}

impl TopKSelection {
    /// Pick the selection suited to `k` out of `candidate_count`.
    ///
    /// The bounded list is used when `k` is below `ratio` of the candidate
    /// count.
    pub fn for_sizes(k: usize, candidate_count: usize, ratio: f32) -> Self {
        if (k as f64) < (candidate_count as f64) * f64::from(ratio) {
            Self::BoundedInsertion
        } else {
            Self::FullSort
        }
    }

    /// Select the top `k` candidates.
    pub fn select<T>(self, candidates: Vec<Scored<T>>, k: usize) -> Vec<Scored<T>> {
        if k == 0 {
            return Vec::new();
        }

        match self {
            Self::BoundedInsertion => bounded_insertion(candidates, k),
            Self::FullSort => {
                let mut candidates = candidates;
                // `sort_by` is stable, which keeps ties in encounter order.
                candidates.sort_by(descending);
                candidates.truncate(k);
                candidates
            }
        }
    }
}

fn bounded_insertion<T>(candidates: Vec<Scored<T>>, k: usize) -> Vec<Scored<T>> {
    let mut kept: Vec<Scored<T>> = Vec::with_capacity(k + 1);

    for candidate in candidates {
        if kept.len() == k {
            let worst = kept.last().map_or(f32::NEG_INFINITY, |w| w.score);
            if OrderedFloat(candidate.score) <= OrderedFloat(worst) {
                continue;
            }
        }

        // Insert after every entry scoring at least as high.
        let position =
            kept.partition_point(|kept| OrderedFloat(kept.score) >= OrderedFloat(candidate.score));
        kept.insert(position, candidate);
        kept.truncate(k);
    }

    kept
}

/// Score `candidates` against `query` and return the top `k` above
/// `min_score`.
///
/// Candidates scoring at or below `min_score` are discarded before ranking.
pub fn find_top_k<'a, T>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (T, &'a [f32])>,
    k: usize,
    min_score: f32,
    partial_sort_ratio: f32,
) -> Vec<Scored<T>> {
    let scored: Vec<Scored<T>> = candidates
        .into_iter()
        .filter_map(|(value, embedding)| {
            let score = cosine_similarity(query, embedding);
            (score > min_score).then(|| Scored::new(value, score))
        })
        .collect();

    TopKSelection::for_sizes(k, scored.len(), partial_sort_ratio).select(scored, k)
}
