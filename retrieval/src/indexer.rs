//! Index construction.
//!
//! Builds from the content source are deduplicated: while one is in
//! flight, every such caller awaits the same shared handle instead of
//! starting another, so each distinct text reaches the embedding provider
//! at most once per build. A build from caller-supplied items has its own
//! input, so it waits for the running build and then runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sift_embeddings::{CachedEmbedder, Embedding, EmbeddingError, EmbeddingSource, content_hash};
use tracing::{debug, info, warn};

use crate::config::IndexingConfig;
use crate::error::{Result, RetrievalError};
use crate::index::{IndexSnapshot, ItemIndex};
use crate::item::Item;
use crate::source::ContentSource;

/// Summary of one completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Items in the published index.
    pub total_items: usize,

    /// Items carrying a vector.
    pub embedded: usize,

    /// Items whose embedding failed.
    pub unembeddable: usize,

    /// Distinct texts answered by the embedding cache.
    pub cache_hits: usize,

    /// Distinct texts that missed the cache and were sent to the provider.
    pub provider_calls: usize,

    pub duration: Duration,
}

type BuildOutcome = std::result::Result<IndexReport, Arc<RetrievalError>>;
type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

struct InFlight {
    generation: u64,
    from_source: bool,
    build: SharedBuild,
}

#[derive(Default)]
struct BuildState {
    in_flight: Option<InFlight>,
    next_generation: u64,
    last_report: Option<IndexReport>,
}

/// Populates the [`ItemIndex`] from a [`ContentSource`].
pub struct Indexer {
    index: Arc<ItemIndex>,
    embedder: CachedEmbedder,
    source: Arc<dyn ContentSource>,
    config: IndexingConfig,
    state: Arc<Mutex<BuildState>>,
}

impl Indexer {
    pub fn new(
        index: Arc<ItemIndex>,
        embedder: CachedEmbedder,
        source: Arc<dyn ContentSource>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            source,
            config,
            state: Arc::new(Mutex::new(BuildState::default())),
        }
    }

    /// Whether at least one build has completed.
    pub fn is_initialized(&self) -> bool {
        lock(&self.state).last_report.is_some()
    }

    /// Report of the most recent completed build.
    pub fn last_report(&self) -> Option<IndexReport> {
        lock(&self.state).last_report.clone()
    }

    /// Build from the content source unless a build already completed.
    pub async fn ensure_initialized(&self) -> Result<IndexReport> {
        self.run(BuildInput::Source, false).await
    }

    /// Rebuild from the content source, joining a build already in flight.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        self.run(BuildInput::Source, true).await
    }

    /// Build from `items`. Waits for a build already in flight, then
    /// replaces the index with these items.
    pub async fn build(&self, items: Vec<Item>) -> Result<IndexReport> {
        self.run(BuildInput::Items(items), true).await
    }

    async fn run(&self, input: BuildInput, force: bool) -> Result<IndexReport> {
        let from_source = matches!(input, BuildInput::Source);

        let build = loop {
            let running = {
                let mut state = lock(&self.state);
                let running = state
                    .in_flight
                    .as_ref()
                    .map(|in_flight| (in_flight.build.clone(), in_flight.from_source));
                match running {
                    Some(running) => running,
                    None => {
                        if !force {
                            if let Some(report) = state.last_report.clone() {
                                return Ok(report);
                            }
                        }
                        let generation = state.next_generation;
                        state.next_generation += 1;
                        let build = self.spawn_build(generation, input);
                        state.in_flight = Some(InFlight {
                            generation,
                            from_source,
                            build: build.clone(),
                        });
                        break build;
                    }
                }
            };

            match running {
                (build, true) if from_source => {
                    debug!("Joining index build already in flight");
                    break build;
                }
                (build, _) => {
                    debug!("Waiting for the running index build to finish");
                    // Its outcome belongs to its own callers.
                    let _ = build.await;
                }
            }
        };

        build.await.map_err(RetrievalError::Shared)
    }

    /// Start a build on the runtime. Must be called with the state lock
    /// held so the task cannot clear `in_flight` before it is stored.
    fn spawn_build(&self, generation: u64, input: BuildInput) -> SharedBuild {
        let index = Arc::clone(&self.index);
        let embedder = self.embedder.clone();
        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let outcome = async {
                let items = match input {
                    BuildInput::Items(items) => items,
                    BuildInput::Source => fetch_all(source.as_ref(), &config).await?,
                };
                let (snapshot, report) = build_snapshot(items, &embedder, &config).await;
                index.publish(snapshot).await;
                Ok::<_, RetrievalError>(report)
            }
            .await
            .map_err(Arc::new);

            let mut build_state = lock(&state);
            if build_state
                .in_flight
                .as_ref()
                .is_some_and(|running| running.generation == generation)
            {
                build_state.in_flight = None;
            }
            match &outcome {
                Ok(report) => {
                    info!(
                        total = report.total_items,
                        embedded = report.embedded,
                        unembeddable = report.unembeddable,
                        provider_calls = report.provider_calls,
                        elapsed_ms = report.duration.as_millis() as u64,
                        "Index build complete"
                    );
                    build_state.last_report = Some(report.clone());
                }
                Err(err) => warn!("Index build failed: {err}"),
            }
            outcome
        });

        task.map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(err) => Err(Arc::new(RetrievalError::TaskFailed(err.to_string()))),
        })
        .boxed()
        .shared()
    }
}

enum BuildInput {
    Source,
    Items(Vec<Item>),
}

fn lock(state: &Mutex<BuildState>) -> MutexGuard<'_, BuildState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn fetch_all(source: &dyn ContentSource, config: &IndexingConfig) -> Result<Vec<Item>> {
    let timeout = config.init_timeout();
    let items = tokio::time::timeout(timeout, source.fetch_items(None))
        .await
        .map_err(|_| RetrievalError::Timeout {
            operation: "content fetch",
            timeout_ms: timeout.as_millis() as u64,
        })??;
    info!(source = source.name(), count = items.len(), "Fetched items for indexing");
    Ok(items)
}

type EmbedOutcome = std::result::Result<(Embedding, EmbeddingSource), EmbeddingError>;

/// Embed every distinct text of `items` in batches and assemble a snapshot.
///
/// Batches of `batch_size` texts run `concurrency` at a time, with a pause
/// between groups. Embedding failures never abort the build; the affected
/// items are indexed without a vector.
async fn build_snapshot(
    items: Vec<Item>,
    embedder: &CachedEmbedder,
    config: &IndexingConfig,
) -> (IndexSnapshot, IndexReport) {
    let start = Instant::now();

    let keyed: Vec<(String, Item)> = items
        .into_iter()
        .map(|item| (content_hash(&item.embeddable_text()), item))
        .collect();

    let mut distinct: IndexMap<String, String> = IndexMap::new();
    for (key, item) in &keyed {
        distinct
            .entry(key.clone())
            .or_insert_with(|| item.embeddable_text());
    }
    let texts: Vec<(&str, &str)> = distinct
        .iter()
        .map(|(k, t)| (k.as_str(), t.as_str()))
        .collect();

    let mut outcomes: HashMap<String, EmbedOutcome> = HashMap::with_capacity(texts.len());
    let batches: Vec<&[(&str, &str)]> = texts.chunks(config.batch_size.max(1)).collect();

    for (group_index, group) in batches.chunks(config.concurrency.max(1)).enumerate() {
        if group_index > 0 && !config.batch_delay().is_zero() {
            tokio::time::sleep(config.batch_delay()).await;
        }

        let group_results = join_all(group.iter().map(|batch| embed_batch(embedder, batch))).await;
        outcomes.extend(group_results.into_iter().flatten());
        debug!(
            group = group_index,
            embedded = outcomes.len(),
            total = texts.len(),
            "Embedded batch group"
        );
    }

    let mut report = IndexReport {
        total_items: 0,
        embedded: 0,
        unembeddable: 0,
        cache_hits: 0,
        provider_calls: 0,
        duration: Duration::ZERO,
    };
    for outcome in outcomes.values() {
        match outcome {
            Ok((_, EmbeddingSource::Cache)) => report.cache_hits += 1,
            Ok((_, EmbeddingSource::Provider)) => report.provider_calls += 1,
            // Refused before any request went out.
            Err(EmbeddingError::ProviderNotConfigured) => {}
            Err(_) => report.provider_calls += 1,
        }
    }

    if let Err(err) = embedder.cache().flush().await {
        warn!("Failed to persist embedding cache: {err}");
    }

    let mut snapshot = IndexSnapshot::new();
    for (key, mut item) in keyed {
        let failure = match outcomes.get(key.as_str()) {
            Some(Ok((embedding, _))) => {
                item.embedding = Some(embedding.clone());
                None
            }
            Some(Err(err)) => {
                if matches!(err, EmbeddingError::ProviderNotConfigured) {
                    debug!(item = %item.id, "No embedding provider, indexing without vector");
                } else {
                    warn!(item = %item.id, "Embedding failed, indexing without vector: {err}");
                }
                item.embedding = None;
                Some(err.to_string())
            }
            None => {
                item.embedding = None;
                Some("embedding was not attempted".to_string())
            }
        };
        snapshot.insert(item, failure);
    }

    report.total_items = snapshot.len();
    report.embedded = snapshot.embedded_count();
    report.unembeddable = report.total_items - report.embedded;
    report.duration = start.elapsed();

    (snapshot, report)
}

async fn embed_batch(
    embedder: &CachedEmbedder,
    batch: &[(&str, &str)],
) -> Vec<(String, EmbedOutcome)> {
    join_all(batch.iter().map(|&(key, text)| async move {
        (key.to_string(), embedder.embed_with_source(text).await)
    }))
    .await
}
