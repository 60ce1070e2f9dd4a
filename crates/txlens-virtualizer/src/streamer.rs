//! Priority-ordered, concurrency-bounded chunk streaming.
//!
//! The expanded viewport is partitioned into a fixed grid; uncached cells
//! are fetched closest-first, at most `max_concurrent_chunks` at a time.
//! Concurrent requests for the same chunk share one in-flight fetch, failed
//! fetches leave the chunk absent and retryable, and a periodic sweep evicts
//! chunks past the cache expiration, unregistering their nodes first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use txlens_types::{BoundingBox, ChunkId, ChunkPayload, ChunkState, DataChunk};

use crate::config::StreamerConfig;
use crate::error::NetworkError;
use crate::retry::FetchClient;
use crate::store::GraphStore;

/// Backing store or API that materializes chunk data. The engine only
/// requires this async contract; it must honor the `chunk_<gx>_<gy>` id
/// convention so bounds round-trip.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_chunk_data(
        &self,
        id: &ChunkId,
        bounds: BoundingBox,
    ) -> Result<ChunkPayload, NetworkError>;
}

struct ChunkEntry {
    chunk: DataChunk,
    loaded_at: Option<Instant>,
}

#[derive(Default)]
struct StreamerState {
    chunks: HashMap<ChunkId, ChunkEntry>,
    /// Subscriptions to in-flight fetches; the sender flips to `true` when
    /// the fetch settles, successfully or not.
    in_flight: HashMap<ChunkId, watch::Receiver<bool>>,
    cache_hits: u64,
    cache_misses: u64,
    recent_loads: VecDeque<Instant>,
}

struct StreamerInner {
    config: StreamerConfig,
    store: Arc<Mutex<GraphStore>>,
    source: Arc<dyn DataSource>,
    client: FetchClient,
    state: Mutex<StreamerState>,
}

/// Chunk lifecycle manager. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct ChunkStreamer {
    inner: Arc<StreamerInner>,
}

impl ChunkStreamer {
    pub fn new(
        config: StreamerConfig,
        store: Arc<Mutex<GraphStore>>,
        source: Arc<dyn DataSource>,
    ) -> Self {
        let client = FetchClient::new(config.network_timeout);
        Self {
            inner: Arc::new(StreamerInner {
                config,
                store,
                source,
                client,
                state: Mutex::new(StreamerState::default()),
            }),
        }
    }

    /// Load one chunk, or return it from cache. Idempotent under races:
    /// concurrent callers for the same id await the single in-flight fetch
    /// rather than duplicating it.
    pub async fn load_chunk(
        &self,
        id: ChunkId,
        bounds: BoundingBox,
    ) -> Result<DataChunk, NetworkError> {
        let waiter = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(entry) = state.chunks.get(&id) {
                if entry.chunk.is_loaded() {
                    let chunk = entry.chunk.clone();
                    state.cache_hits += 1;
                    return Ok(chunk);
                }
            }
            match state.in_flight.get(&id) {
                Some(rx) => Some(rx.clone()),
                None => {
                    state.cache_misses += 1;
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            // A send error means the fetch task settled and dropped its
            // sender; the registry below is authoritative either way.
            let _ = rx.wait_for(|done| *done).await;
            let state = self.inner.state.lock().unwrap();
            return match state.chunks.get(&id) {
                Some(entry) if entry.chunk.is_loaded() => Ok(entry.chunk.clone()),
                _ => Err(NetworkError::Transport(format!(
                    "in-flight fetch for {} failed upstream",
                    id
                ))),
            };
        }

        let tx = self.register_loading(&id, bounds, 1.0);
        self.run_fetch(id, bounds, tx).await
    }

    /// Queue fetches for every uncached grid cell covering the expanded
    /// viewport plus the prefetch margin, closest-to-center first, bounded
    /// by the concurrency cap. Returns how many fetches were launched;
    /// cells that did not fit wait for a future viewport update.
    pub async fn load_visible_chunks(&self, viewport_bounds: BoundingBox) -> usize {
        let cell = self.inner.config.chunk_size;
        let margin = self.inner.config.prefetch_distance;
        let (center_x, center_y) = viewport_bounds.center();

        let min_gx = (viewport_bounds.min_x / cell).floor() as i64 - margin;
        let max_gx = (viewport_bounds.max_x / cell).floor() as i64 + margin;
        let min_gy = (viewport_bounds.min_y / cell).floor() as i64 - margin;
        let max_gy = (viewport_bounds.max_y / cell).floor() as i64 + margin;

        let launches = {
            let mut state = self.inner.state.lock().unwrap();
            let mut candidates = Vec::new();
            for gx in min_gx..=max_gx {
                for gy in min_gy..=max_gy {
                    let id = ChunkId::from_cell(gx, gy);
                    if state.chunks.contains_key(&id) {
                        continue;
                    }
                    let bounds = BoundingBox::from_origin_size(
                        gx as f32 * cell,
                        gy as f32 * cell,
                        cell,
                        cell,
                    );
                    let (cx, cy) = bounds.center();
                    let distance = ((cx - center_x).powi(2) + (cy - center_y).powi(2)).sqrt();
                    let priority = 1.0 / (1.0 + distance);
                    candidates.push((id, bounds, priority));
                }
            }

            let available = self
                .inner
                .config
                .max_concurrent_chunks
                .saturating_sub(state.in_flight.len());
            candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(available);

            candidates
                .into_iter()
                .map(|(id, bounds, priority)| {
                    state.cache_misses += 1;
                    let tx = Self::register_loading_locked(&mut state, &id, bounds, priority);
                    (id, bounds, tx)
                })
                .collect::<Vec<_>>()
        };

        let launched = launches.len();
        for (id, bounds, tx) in launches {
            let streamer = self.clone();
            tokio::spawn(async move {
                // Failures are logged inside run_fetch and leave the chunk
                // retryable on the next viewport pass.
                let _ = streamer.run_fetch(id, bounds, tx).await;
            });
        }
        launched
    }

    /// Evict chunks whose age exceeds the cache expiration, removing their
    /// nodes from the spatial index first. Returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<DataChunk> = {
            let mut state = self.inner.state.lock().unwrap();
            let expiration = self.inner.config.cache_expiration;
            let ids: Vec<ChunkId> = state
                .chunks
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .loaded_at
                        .is_some_and(|at| now.duration_since(at) > expiration)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| state.chunks.remove(&id))
                .map(|entry| entry.chunk)
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut store = self.inner.store.lock().unwrap();
        for chunk in &expired {
            store.unregister(&chunk.nodes, &chunk.edges);
            debug!(chunk = %chunk.id, nodes = chunk.nodes.len(), "chunk expired");
        }
        expired.len()
    }

    pub fn chunk(&self, id: &ChunkId) -> Option<DataChunk> {
        self.inner
            .state
            .lock()
            .unwrap()
            .chunks
            .get(id)
            .map(|entry| entry.chunk.clone())
    }

    pub fn loading_count(&self) -> usize {
        self.inner.state.lock().unwrap().in_flight.len()
    }

    pub fn loaded_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .chunks
            .values()
            .filter(|entry| entry.chunk.is_loaded())
            .count()
    }

    pub fn cache_hit_ratio(&self) -> f32 {
        let state = self.inner.state.lock().unwrap();
        let total = state.cache_hits + state.cache_misses;
        if total == 0 {
            0.0
        } else {
            state.cache_hits as f32 / total as f32
        }
    }

    /// Chunks loaded per second over the configured window.
    pub fn streaming_rate(&self) -> f32 {
        let mut state = self.inner.state.lock().unwrap();
        let window = self.inner.config.streaming_rate_window;
        if let Some(cutoff) = Instant::now().checked_sub(window) {
            while state.recent_loads.front().is_some_and(|at| *at < cutoff) {
                state.recent_loads.pop_front();
            }
        }
        state.recent_loads.len() as f32 / window.as_secs_f32()
    }

    /// The per-URL failure record kept by the retry layer, keyed by chunk id.
    pub fn failure_context(&self, id: &ChunkId) -> Option<txlens_types::NetworkFailureContext> {
        self.inner.client.failure_context(id.as_str())
    }

    fn register_loading(
        &self,
        id: &ChunkId,
        bounds: BoundingBox,
        priority: f32,
    ) -> watch::Sender<bool> {
        let mut state = self.inner.state.lock().unwrap();
        Self::register_loading_locked(&mut state, id, bounds, priority)
    }

    fn register_loading_locked(
        state: &mut StreamerState,
        id: &ChunkId,
        bounds: BoundingBox,
        priority: f32,
    ) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        state.chunks.insert(
            id.clone(),
            ChunkEntry {
                chunk: DataChunk::loading(id.clone(), bounds, priority),
                loaded_at: None,
            },
        );
        state.in_flight.insert(id.clone(), rx);
        tx
    }

    /// Fetch one registered chunk through the retry layer and commit the
    /// outcome. On failure the chunk entry is removed entirely so a later
    /// viewport pass can retry it.
    async fn run_fetch(
        &self,
        id: ChunkId,
        bounds: BoundingBox,
        done_tx: watch::Sender<bool>,
    ) -> Result<DataChunk, NetworkError> {
        let source = Arc::clone(&self.inner.source);
        let fetch_id = id.clone();
        let result = self
            .inner
            .client
            .request(id.as_str(), "GET", &self.inner.config.retry, move || {
                let source = Arc::clone(&source);
                let id = fetch_id.clone();
                async move { source.fetch_chunk_data(&id, bounds).await }
            })
            .await;

        let outcome = match result {
            Ok(payload) => {
                let node_count = payload.nodes.len();
                let (nodes, edges) = {
                    let mut store = self.inner.store.lock().unwrap();
                    store.register_payload(payload)
                };

                let mut state = self.inner.state.lock().unwrap();
                let now = Instant::now();
                state.recent_loads.push_back(now);
                state.in_flight.remove(&id);
                match state.chunks.get_mut(&id) {
                    Some(entry) => {
                        entry.chunk.nodes = nodes;
                        entry.chunk.edges = edges;
                        entry.chunk.state = ChunkState::Loaded;
                        entry.loaded_at = Some(now);
                        debug!(chunk = %id, nodes = node_count, "chunk loaded");
                        Ok(entry.chunk.clone())
                    }
                    // Swept while the fetch was resolving; data stays
                    // registered (last-write-wins) and the next sweep or
                    // reload reconciles it.
                    None => Ok(DataChunk {
                        id: id.clone(),
                        bounds,
                        nodes,
                        edges,
                        state: ChunkState::Loaded,
                        priority: 0.0,
                    }),
                }
            }
            Err(err) => {
                let mut state = self.inner.state.lock().unwrap();
                state.in_flight.remove(&id);
                state.chunks.remove(&id);
                warn!(chunk = %id, error = %err, "chunk fetch failed, will retry on a later pass");
                Err(err)
            }
        };

        let _ = done_tx.send(true);
        outcome
    }
}
