//! Search results and their provenance.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::item::Item;

/// The strategy that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Remote catalog queried with the request text.
    Dynamic,
    /// Managed cloud vector search.
    Vertex,
    /// In-process cosine similarity over the index.
    Local,
    /// Keyword scoring over the index.
    Text,
    /// Canned answer; every strategy came back empty or unconfigured.
    BasicFallback,
    /// Canned answer; at least one strategy failed with an error.
    ErrorFallback,
}

impl SearchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Vertex => "vertex",
            Self::Local => "local",
            Self::Text => "text",
            Self::BasicFallback => "basic_fallback",
            Self::ErrorFallback => "error_fallback",
        }
    }

    /// Structural confidence of results served by this method.
    pub fn confidence(self) -> f32 {
        match self {
            Self::Dynamic => 0.9,
            Self::Vertex => 0.85,
            Self::Local => 0.8,
            Self::Text => 0.5,
            Self::BasicFallback => 0.1,
            Self::ErrorFallback => 0.0,
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, Self::BasicFallback | Self::ErrorFallback)
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Ranked items.
    pub items: Vec<Item>,

    /// Number of items returned.
    pub total: usize,

    /// The query text as received.
    pub query: String,

    /// Time spent answering this call.
    pub processing_time: Duration,

    /// Whether the answer came from the result cache.
    pub used_cache: bool,

    pub search_method: SearchMethod,

    pub confidence: f32,
}

impl SearchResult {
    pub fn new(
        query: impl Into<String>,
        items: Vec<Item>,
        search_method: SearchMethod,
        processing_time: Duration,
    ) -> Self {
        Self {
            total: items.len(),
            items,
            query: query.into(),
            processing_time,
            used_cache: false,
            search_method,
            confidence: search_method.confidence(),
        }
    }

    /// Copy of a cached result answering `query`, stamped with the lookup
    /// cost.
    pub(crate) fn served_from_cache(&self, query: &str, lookup_time: Duration) -> Self {
        Self {
            query: query.to_string(),
            used_cache: true,
            processing_time: lookup_time,
            ..self.clone()
        }
    }
}
