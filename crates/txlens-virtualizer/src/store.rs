//! Shared graph storage for one session: the spatial index plus the edge
//! registry. Mutated only by the chunk streamer (registration/eviction) and
//! the viewport virtualizer (visibility flags), both on the same logical
//! thread of control.

use std::collections::HashMap;

use txlens_types::{ChunkPayload, EdgeId, GraphEdge, NodeId};

use crate::config::SpatialConfig;
use crate::spatial::SpatialIndex;

#[derive(Debug)]
pub struct GraphStore {
    pub index: SpatialIndex,
    pub edges: HashMap<EdgeId, GraphEdge>,
}

impl GraphStore {
    pub fn new(config: SpatialConfig) -> Self {
        Self {
            index: SpatialIndex::new(config),
            edges: HashMap::new(),
        }
    }

    /// Register a fetched chunk payload, returning the ids now owned by the
    /// store so the chunk can later be evicted as a unit.
    pub fn register_payload(&mut self, payload: ChunkPayload) -> (Vec<NodeId>, Vec<EdgeId>) {
        let mut node_ids = Vec::with_capacity(payload.nodes.len());
        for node in payload.nodes {
            node_ids.push(node.id.clone());
            self.index.insert(node);
        }

        let mut edge_ids = Vec::with_capacity(payload.edges.len());
        for edge in payload.edges {
            edge_ids.push(edge.id.clone());
            self.edges.insert(edge.id.clone(), edge);
        }

        (node_ids, edge_ids)
    }

    /// Remove an evicted chunk's elements. Nodes leave the spatial index
    /// first so no query can observe an edge whose endpoints are gone.
    pub fn unregister(&mut self, nodes: &[NodeId], edges: &[EdgeId]) {
        for id in nodes {
            self.index.remove(id);
        }
        for id in edges {
            self.edges.remove(id);
        }
    }

    /// Adjacency relation over currently loaded nodes, preserving each
    /// node's ordered connection list.
    pub fn adjacency(&self) -> HashMap<NodeId, Vec<NodeId>> {
        self.index
            .iter()
            .map(|node| (node.id.clone(), node.connections.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlens_types::{BoundingBox, GraphEdge, GraphNode};

    #[test]
    fn register_then_unregister_round_trips() {
        let mut store = GraphStore::new(SpatialConfig::default());
        let payload = ChunkPayload {
            nodes: vec![
                GraphNode::new("a", 0.0, 0.0, 0),
                GraphNode::new("b", 10.0, 10.0, 1),
            ],
            edges: vec![GraphEdge::new("e1", "a", "b")],
        };

        let (nodes, edges) = store.register_payload(payload);
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
        assert_eq!(store.index.len(), 2);
        assert_eq!(store.edges.len(), 1);

        store.unregister(&nodes, &edges);
        assert!(store.index.is_empty());
        assert!(store.edges.is_empty());
        assert!(store
            .index
            .query(&BoundingBox::new(-100.0, -100.0, 100.0, 100.0))
            .is_empty());
    }

    #[test]
    fn adjacency_preserves_connection_order() {
        let mut store = GraphStore::new(SpatialConfig::default());
        let node = GraphNode::new("a", 0.0, 0.0, 0)
            .with_connections(vec!["c".into(), "b".into(), "d".into()]);
        store.register_payload(ChunkPayload {
            nodes: vec![node],
            edges: vec![],
        });

        let adjacency = store.adjacency();
        assert_eq!(
            adjacency[&NodeId::new("a")],
            vec![NodeId::new("c"), NodeId::new("b"), NodeId::new("d")]
        );
    }
}
