//! Embedding cache keyed by content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::similarity::validate_embedding;

/// Hash of the exact text handed to the provider.
///
/// Two inputs with identical text share one key regardless of where they
/// came from.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Cache entry for an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hash of the embedded text.
    pub text_hash: String,

    /// The embedding vector.
    pub embedding: Embedding,

    /// Insertion sequence, used for oldest-first eviction.
    pub sequence: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_sequence: u64,

    /// Entries changed since the last successful flush.
    dirty: bool,
}

/// Cache for embeddings to avoid redundant provider calls.
///
/// The in-memory map is authoritative. A persistent cache is written to
/// disk only by [`EmbeddingCache::flush`], so a failing disk never costs a
/// vector that was already fetched.
pub struct EmbeddingCache {
    /// In-memory cache.
    state: Arc<RwLock<CacheState>>,

    /// Path for persistent cache storage.
    cache_path: Option<PathBuf>,

    /// Maximum cache size, unbounded when `None`.
    max_entries: Option<usize>,
}

impl EmbeddingCache {
    /// Create an unbounded in-memory cache.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            cache_path: None,
            max_entries: None,
        }
    }

    /// Create an in-memory cache holding at most `max_entries` vectors.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new()
        }
    }

    /// Create a cache with persistent storage.
    pub async fn with_persistence(
        path: impl AsRef<Path>,
        max_entries: Option<usize>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let cache = Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            cache_path: Some(path.clone()),
            max_entries: max_entries.map(|m| m.max(1)),
        };

        if path.exists() {
            cache.load().await?;
        }

        Ok(cache)
    }

    /// Get an embedding by text hash.
    pub async fn get(&self, text_hash: &str) -> Option<Embedding> {
        let state = self.state.read().await;
        state.entries.get(text_hash).map(|e| e.embedding.clone())
    }

    /// Store an embedding under a text hash.
    pub async fn put(&self, text_hash: impl Into<String>, embedding: Embedding) {
        let text_hash = text_hash.into();
        let mut state = self.state.write().await;

        if let Some(max_entries) = self.max_entries {
            if !state.entries.contains_key(&text_hash) && state.entries.len() >= max_entries {
                if let Some(oldest_key) = state
                    .entries
                    .iter()
                    .min_by_key(|(_, v)| v.sequence)
                    .map(|(k, _)| k.clone())
                {
                    state.entries.remove(&oldest_key);
                }
            }
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            text_hash.clone(),
            CacheEntry {
                text_hash,
                embedding,
                sequence,
            },
        );
        state.dirty = true;
        debug!("Cached embedding ({} entries)", state.entries.len());
    }

    /// Write a persistent cache to disk if it changed since the last flush.
    ///
    /// No-op for in-memory caches. On failure the entries stay in memory and
    /// remain marked for the next flush.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = self.cache_path.as_deref() else {
            return Ok(());
        };

        let (content, count) = {
            let mut state = self.state.write().await;
            if !state.dirty {
                return Ok(());
            }
            let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
            entries.sort_by_key(|e| e.sequence);
            let content = serde_json::to_string(&entries)?;
            let count = entries.len();
            state.dirty = false;
            (content, count)
        };

        if let Err(err) = write_cache_file(path, &content).await {
            self.state.write().await.dirty = true;
            return Err(err);
        }
        debug!("Saved {count} cache entries to disk");
        Ok(())
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text_hash: &str) -> bool {
        self.state.read().await.entries.contains_key(text_hash)
    }

    /// Number of cached vectors.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the cache holds no vectors.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.dirty = true;
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            persistent: self.cache_path.is_some(),
        }
    }

    async fn load(&self) -> Result<()> {
        if let Some(ref path) = self.cache_path {
            let content = fs::read_to_string(path).await?;
            let entries: Vec<CacheEntry> = serde_json::from_str(&content)?;

            let mut state = self.state.write().await;
            for entry in entries {
                state.next_sequence = state.next_sequence.max(entry.sequence + 1);
                state.entries.insert(entry.text_hash.clone(), entry);
            }

            info!("Loaded {} cache entries from disk", state.entries.len());
        }
        Ok(())
    }
}

async fn write_cache_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;
    Ok(())
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: Option<usize>,

    /// Whether entries are written to disk.
    pub persistent: bool,
}

/// Where a vector handed out by [`CachedEmbedder`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    /// Served from the cache.
    Cache,
    /// Fetched from the provider and cached.
    Provider,
}

/// Provider and cache bundled behind one timeout-bounded call.
#[derive(Clone)]
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    timeout: Duration,
}

impl CachedEmbedder {
    /// Create a new cached embedder.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    /// Embed `text`, using the cache if available.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_with_source(text).await.map(|(e, _)| e)
    }

    /// Embed `text` and report whether the cache answered.
    pub async fn embed_with_source(&self, text: &str) -> Result<(Embedding, EmbeddingSource)> {
        let key = content_hash(text);
        if let Some(embedding) = self.cache.get(&key).await {
            debug!("Cache hit for embedding");
            return Ok((embedding, EmbeddingSource::Cache));
        }

        if !self.provider.is_available() {
            return Err(EmbeddingError::ProviderNotConfigured);
        }

        let request = EmbeddingRequest::new(text);
        let response = tokio::time::timeout(self.timeout, self.provider.embed(request))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        validate_embedding(&response.embedding)?;
        self.cache.put(key, response.embedding.clone()).await;

        Ok((response.embedding, EmbeddingSource::Provider))
    }

    /// Get the underlying provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }
}
