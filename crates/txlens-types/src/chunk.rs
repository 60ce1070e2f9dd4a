//! Chunk model: fixed-size spatial cells of graph data loaded and evicted
//! as a unit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::BoundingBox;
use crate::graph::{EdgeId, GraphEdge, GraphNode, NodeId};

/// Identifier of a spatial chunk.
///
/// The wire convention is `chunk_<gridX>_<gridY>`; a data source must honor
/// it so chunk bounds round-trip. Both directions are provided here:
/// [`ChunkId::from_cell`] and [`ChunkId::cell`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the canonical id for a grid cell.
    pub fn from_cell(grid_x: i64, grid_y: i64) -> Self {
        Self(format!("chunk_{}_{}", grid_x, grid_y))
    }

    /// Parse the grid cell back out of a canonical id. Returns `None` for
    /// ids that do not follow the `chunk_<gx>_<gy>` convention.
    pub fn cell(&self) -> Option<(i64, i64)> {
        let rest = self.0.strip_prefix("chunk_")?;
        let (gx, gy) = rest.split_once('_')?;
        Some((gx.parse().ok()?, gy.parse().ok()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a chunk. A failed or never-requested chunk simply has
/// no registry entry, so the enum only needs the two live states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    /// Fetch in flight; concurrent requests await it instead of duplicating.
    Loading,
    /// Fetched and registered; subject to cache expiry.
    Loaded,
}

impl ChunkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

/// A loaded (or loading) chunk of graph data.
///
/// Nodes are owned by the spatial index once registered; the chunk keeps
/// only their ids so eviction knows what to unregister.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChunk {
    pub id: ChunkId,
    pub bounds: BoundingBox,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub state: ChunkState,
    /// Load priority at request time: `1 / (1 + distance from viewport center)`.
    pub priority: f32,
}

impl DataChunk {
    pub fn loading(id: ChunkId, bounds: BoundingBox, priority: f32) -> Self {
        Self {
            id,
            bounds,
            nodes: Vec::new(),
            edges: Vec::new(),
            state: ChunkState::Loading,
            priority,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_loaded()
    }
}

/// What a data source returns for one chunk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
