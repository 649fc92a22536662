//! External collaborators that supply items.

use async_trait::async_trait;

use crate::error::Result;
use crate::item::Item;
use crate::query::{Query, normalize_text};

/// A catalog of raw items.
///
/// `fetch_items(None)` returns the full catalog for indexing;
/// `fetch_items(Some(text))` asks the catalog for items relevant to `text`.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Fetch items, optionally narrowed by a query text.
    async fn fetch_items(&self, query: Option<&str>) -> Result<Vec<Item>>;
}

/// Managed vector search over a remote index.
#[async_trait]
pub trait CloudVectorSearch: Send + Sync {
    /// Whether an endpoint is configured. Unconfigured backends are skipped
    /// without counting as a failure.
    fn is_configured(&self) -> bool {
        true
    }

    /// Return up to `limit` items ranked by the remote index.
    async fn search(&self, query: &Query, limit: usize) -> Result<Vec<Item>>;
}

/// A fixed, in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticContentSource {
    items: Vec<Item>,
}

impl StaticContentSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_items(&self, query: Option<&str>) -> Result<Vec<Item>> {
        let Some(query) = query else {
            return Ok(self.items.clone());
        };

        let normalized = normalize_text(query);
        let terms: Vec<&str> = normalized.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .items
            .iter()
            .filter(|item| {
                let text = item.searchable_text();
                terms.iter().any(|term| text.contains(term))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_static_source_narrows_by_terms() {
        let source = StaticContentSource::new(vec![
            Item::new("1", "市立保育園"),
            Item::new("2", "図書館"),
        ]);

        assert_eq!(source.fetch_items(None).await.unwrap().len(), 2);

        let hits = source.fetch_items(Some("保育園")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        assert!(source.fetch_items(Some("   ")).await.unwrap().is_empty());
    }
}
