//! Search queries and their cache fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::item::Item;

/// Restrictions applied to candidate items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Earliest `last_updated`, inclusive.
    pub date_from: Option<DateTime<Utc>>,

    /// Latest `last_updated`, inclusive.
    pub date_to: Option<DateTime<Utc>>,

    /// Item must carry at least one of these tags (case-insensitive).
    pub tags: Vec<String>,
}

impl QueryFilters {
    fn matches(&self, item: &Item) -> bool {
        let updated = item.metadata.last_updated;
        if self.date_from.is_some_and(|from| updated < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| updated > to) {
            return false;
        }
        if !self.tags.is_empty() {
            return self.tags.iter().any(|wanted| {
                let wanted = wanted.to_lowercase();
                item.tags.iter().any(|t| t.to_lowercase() == wanted)
            });
        }
        true
    }
}

/// A free-text search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    pub language: String,

    pub category: Option<String>,

    pub filters: Option<QueryFilters>,

    /// Maximum number of results; the engine default applies when unset.
    pub limit: Option<usize>,
}

impl Query {
    /// Create a query in the given language.
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            category: None,
            filters: None,
            limit: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Effective result limit.
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }

    /// Query text with surrounding whitespace trimmed, inner runs collapsed
    /// and letters lowercased.
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text)
    }

    /// Whether `item` passes the category and filter restrictions.
    pub fn accepts(&self, item: &Item) -> bool {
        if let Some(category) = &self.category {
            if !item.category.eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        self.filters.as_ref().is_none_or(|f| f.matches(item))
    }

    /// Deterministic cache key over the normalized query fields.
    ///
    /// Queries differing only in casing or whitespace share a fingerprint.
    pub fn fingerprint(&self, default_limit: usize) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update([0x1f]);
        };

        field(&self.normalized_text());
        field(&self.language.trim().to_lowercase());
        field(&self.category.as_deref().map(normalize_text).unwrap_or_default());

        match &self.filters {
            Some(filters) => {
                field(&filters.date_from.map(|d| d.to_rfc3339()).unwrap_or_default());
                field(&filters.date_to.map(|d| d.to_rfc3339()).unwrap_or_default());
                let mut tags: Vec<String> =
                    filters.tags.iter().map(|t| normalize_text(t)).collect();
                tags.sort();
                tags.dedup();
                field(&tags.join(","));
            }
            None => {
                field("");
                field("");
                field("");
            }
        }

        field(&self.limit_or(default_limit).to_string());

        format!("{:x}", hasher.finalize())
    }

    /// Short prefix of the query text for log lines.
    pub(crate) fn log_prefix(&self) -> String {
        self.text.chars().take(40).collect()
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
