//! Graph element types: nodes, edges, and traversal records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a graph node (account address, txid, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of a graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EdgeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A positioned graph node.
///
/// Owned by the spatial index once inserted. `is_visible` and
/// `last_render_time_ms` are mutated only by the viewport virtualizer;
/// everything else is fixed at creation by the chunk streamer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    /// Importance tier; 0 is most important and always survives LOD skipping.
    pub level: u8,
    /// Ordered neighbor ids, as delivered by the data source.
    #[serde(default)]
    pub connections: Vec<NodeId>,
    #[serde(default)]
    pub is_visible: bool,
    /// Milliseconds since session start at the last visibility stamp.
    #[serde(default)]
    pub last_render_time_ms: Option<u64>,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, x: f32, y: f32, level: u8) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            level,
            connections: Vec::new(),
            is_visible: false,
            last_render_time_ms: None,
        }
    }

    pub fn with_connections(mut self, connections: Vec<NodeId>) -> Self {
        self.connections = connections;
        self
    }
}

/// A graph edge. Visibility is derived from endpoint visibility and never
/// stored authoritatively anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub is_visible: bool,
}

impl GraphEdge {
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            is_visible: false,
        }
    }
}

/// A detected traversal cycle: the path from the first occurrence of
/// `node_id` up to the current position. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularReference {
    pub node_id: NodeId,
    pub path: Vec<NodeId>,
    pub depth: usize,
}
