//! Content items served by the engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_embeddings::Embedding;

/// Provenance of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Where the item was ingested from.
    pub source: String,

    /// When the item content last changed.
    pub last_updated: DateTime<Utc>,

    /// Content language (e.g. `ja`).
    pub language: String,
}

/// A retrievable content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub id: String,

    pub title: String,

    pub description: String,

    pub content: String,

    pub category: String,

    pub tags: BTreeSet<String>,

    pub metadata: ItemMetadata,

    /// Attached by the indexer; either absent or a complete vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl Item {
    /// Create an item with empty body fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            content: String::new(),
            category: String::new(),
            tags: BTreeSet::new(),
            metadata: ItemMetadata {
                source: String::new(),
                last_updated: Utc::now(),
                language: "ja".to_string(),
            },
            embedding: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = language.into();
        self
    }

    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.metadata.last_updated = last_updated;
        self
    }

    /// The exact text handed to the embedding provider.
    pub fn embeddable_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.content)
    }

    /// Whether a vector is attached.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Lowercased haystack used by keyword matching.
    pub(crate) fn searchable_text(&self) -> String {
        let mut text = self.embeddable_text();
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}
