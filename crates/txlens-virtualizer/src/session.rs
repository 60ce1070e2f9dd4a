//! One user-facing graph session: wires the spatial store, viewport
//! virtualizer, chunk streamer, and operation tracker into a single
//! context object. Hosts create one per open graph view; nothing here is
//! global.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use txlens_types::{
    BoundingBox, ChunkId, DataChunk, EdgeId, NodeId, OperationKind, PerformanceMetrics, Viewport,
};

use crate::config::EngineConfig;
use crate::cycle::{break_circular_reference, detect_circular_reference};
use crate::error::NetworkError;
use crate::store::GraphStore;
use crate::streamer::{ChunkStreamer, DataSource};
use crate::tracker::OperationTracker;
use crate::virtualizer::Virtualizer;

const DEFAULT_VIEW_WIDTH: f32 = 800.0;
const DEFAULT_VIEW_HEIGHT: f32 = 600.0;

pub struct GraphSession {
    config: EngineConfig,
    store: Arc<Mutex<GraphStore>>,
    virtualizer: Virtualizer,
    streamer: ChunkStreamer,
    tracker: OperationTracker,
    last_viewport: Option<Viewport>,
}

impl GraphSession {
    pub fn new(config: EngineConfig, source: Arc<dyn DataSource>) -> Self {
        let store = Arc::new(Mutex::new(GraphStore::new(config.spatial.clone())));
        let streamer = ChunkStreamer::new(config.streamer.clone(), Arc::clone(&store), source);
        let tracker = OperationTracker::new(config.tracker.clone());
        let virtualizer = Virtualizer::new(config.virtualizer.clone());
        Self {
            config,
            store,
            virtualizer,
            streamer,
            tracker,
            last_viewport: None,
        }
    }

    /// Pan/zoom to a new viewport: recompute visibility against what is
    /// loaded, then start streaming the chunks the expanded viewport now
    /// covers. Returns how many chunk fetches were launched; freshly loaded
    /// data appears on the next call, which hosts issue every frame anyway.
    pub async fn update_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        zoom: f32,
    ) -> usize {
        let viewport = Viewport::new(x, y, width, height, zoom);
        self.last_viewport = Some(viewport);

        let expanded = {
            let mut store = self.store.lock().unwrap();
            self.virtualizer.update_viewport(&mut store, viewport)
        };
        self.streamer.load_visible_chunks(expanded).await
    }

    /// Navigate to a node along a traversal path, resolving cycles.
    ///
    /// Registered with the tracker as `jump_<node>`, so a duplicate pending
    /// jump to the same node is rejected and a higher-priority jump cancels
    /// lower ones. Returns whether the navigation ran to completion.
    pub async fn jump_to_node(
        &mut self,
        node_id: &NodeId,
        traversal_path: &[NodeId],
        priority: u32,
    ) -> bool {
        let op_id = format!("jump_{}", node_id);
        if !self.tracker.track(&op_id, OperationKind::Navigation, priority) {
            return false;
        }
        // track() just registered this id.
        let handle = match self.tracker.handle(&op_id) {
            Some(handle) => handle,
            None => return false,
        };

        if let Some(cycle) = detect_circular_reference(node_id, traversal_path) {
            let from = match traversal_path.last() {
                Some(last) => last.clone(),
                None => {
                    self.tracker.complete(&op_id, false);
                    return false;
                }
            };
            let adjacency = self.store.lock().unwrap().adjacency();
            match break_circular_reference(
                &from,
                node_id,
                &adjacency,
                self.config.max_circular_depth,
            ) {
                Some(route) => {
                    debug!(node = %node_id, depth = cycle.depth, hops = route.len() - 1,
                        "cycle resolved via alternate route");
                }
                None => {
                    warn!(node = %node_id, depth = cycle.depth, "cycle has no alternate route");
                    self.tracker.complete(&op_id, false);
                    return false;
                }
            }
        }

        let position = {
            let store = self.store.lock().unwrap();
            store.index.get(node_id).map(|node| (node.x, node.y))
        };
        let (x, y) = match position {
            Some(position) => position,
            None => {
                warn!(node = %node_id, "jump target is not loaded");
                self.tracker.complete(&op_id, false);
                return false;
            }
        };

        // A competing higher-priority jump may have preempted us while the
        // cycle check ran; bail before touching the viewport.
        if handle.is_cancelled() {
            return false;
        }

        let (width, height, zoom) = match self.last_viewport {
            Some(viewport) => (viewport.width, viewport.height, viewport.zoom),
            None => (DEFAULT_VIEW_WIDTH, DEFAULT_VIEW_HEIGHT, 1.0),
        };
        self.update_viewport(x - width / 2.0, y - height / 2.0, width, height, zoom)
            .await;

        self.tracker.complete(&op_id, true);
        true
    }

    /// Load one chunk immediately, bypassing viewport-driven scheduling.
    pub async fn load_chunk(&self, id: ChunkId, bounds: BoundingBox) -> Result<DataChunk, NetworkError> {
        self.streamer.load_chunk(id, bounds).await
    }

    /// Evict loaded chunks past the cache expiration. Hosts call this on
    /// their own cadence, typically once per minute.
    pub fn sweep_expired(&self) -> usize {
        self.streamer.sweep_expired()
    }

    pub fn is_node_visible(&self, id: &NodeId) -> bool {
        self.virtualizer.is_node_visible(id)
    }

    pub fn is_edge_visible(&self, id: &EdgeId) -> bool {
        self.virtualizer.is_edge_visible(id)
    }

    pub fn visible_node_count(&self) -> usize {
        self.virtualizer.visible_nodes().len()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let (node_count, edge_count) = {
            let store = self.store.lock().unwrap();
            (store.index.len(), store.edges.len())
        };
        PerformanceMetrics {
            node_count,
            edge_count,
            render_time_ms: self.virtualizer.last_update_cost_ms(),
            cache_hit_ratio: self.streamer.cache_hit_ratio(),
            data_streaming_rate: self.streamer.streaming_rate(),
        }
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn streamer(&self) -> &ChunkStreamer {
        &self.streamer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
