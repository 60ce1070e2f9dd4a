//! Viewport-driven visibility and level-of-detail filtering.
//!
//! Given the current pan/zoom, recomputes the visible element set: expand
//! the viewport by a buffer zone, query the spatial index, apply the LOD
//! tier for the current zoom, and bound the surviving set. Frame cost is
//! therefore bounded by the tier's `max_nodes`, independent of graph size.
//!
//! This is the only component allowed to flip visibility flags.

use std::collections::HashSet;
use std::time::Instant;

use tracing::debug;
use txlens_types::{BoundingBox, EdgeId, NodeId, Viewport};

use crate::config::{LodTier, VirtualizerConfig};
use crate::store::GraphStore;

// Used when the configured tier table is empty.
const PERMISSIVE_TIER: LodTier = LodTier {
    min_zoom: 0.0,
    max_nodes: usize::MAX,
    skip_level: u8::MAX,
};

pub struct Virtualizer {
    config: VirtualizerConfig,
    visible_nodes: HashSet<NodeId>,
    visible_edges: HashSet<EdgeId>,
    last_expanded: Option<BoundingBox>,
    last_update_cost_ms: f32,
    epoch: Instant,
}

impl Virtualizer {
    pub fn new(config: VirtualizerConfig) -> Self {
        Self {
            config,
            visible_nodes: HashSet::new(),
            visible_edges: HashSet::new(),
            last_expanded: None,
            last_update_cost_ms: 0.0,
            epoch: Instant::now(),
        }
    }

    /// Recompute the visible set for the given viewport. Returns the
    /// buffer-expanded rectangle so the streamer can materialize it.
    ///
    /// Idempotent and cheap by design: a stale chunk registering nodes after
    /// this ran is simply picked up (or filtered out) by the next call.
    pub fn update_viewport(&mut self, store: &mut GraphStore, viewport: Viewport) -> BoundingBox {
        let started = Instant::now();
        let expanded = viewport.bounds().expand(self.config.buffer_zone);
        let tier = self.tier_for(viewport.zoom);

        let mut survivors: Vec<(NodeId, u8)> = store
            .index
            .query(&expanded)
            .into_iter()
            .filter(|node| node.level == 0 || node.level <= tier.skip_level)
            .map(|node| (node.id.clone(), node.level))
            .collect();

        // Level 0 anchors sort first, so truncation drops the least
        // important survivors.
        survivors.sort_by_key(|(_, level)| *level);
        survivors.truncate(tier.max_nodes);

        let next_visible: HashSet<NodeId> = survivors.into_iter().map(|(id, _)| id).collect();
        let stamp = self.epoch.elapsed().as_millis() as u64;

        for id in self.visible_nodes.difference(&next_visible) {
            store.index.mark_visibility(id, false, None);
        }
        for id in next_visible.difference(&self.visible_nodes) {
            store.index.mark_visibility(id, true, Some(stamp));
        }
        self.visible_nodes = next_visible;

        // An edge is visible iff both endpoints survived.
        self.visible_edges.clear();
        for edge in store.edges.values_mut() {
            edge.is_visible = self.visible_nodes.contains(&edge.source)
                && self.visible_nodes.contains(&edge.target);
            if edge.is_visible {
                self.visible_edges.insert(edge.id.clone());
            }
        }

        self.last_expanded = Some(expanded);
        self.last_update_cost_ms = started.elapsed().as_secs_f32() * 1000.0;
        debug!(
            zoom = viewport.zoom,
            visible_nodes = self.visible_nodes.len(),
            visible_edges = self.visible_edges.len(),
            "viewport updated"
        );

        expanded
    }

    pub fn is_node_visible(&self, id: &NodeId) -> bool {
        self.visible_nodes.contains(id)
    }

    pub fn is_edge_visible(&self, id: &EdgeId) -> bool {
        self.visible_edges.contains(id)
    }

    pub fn visible_nodes(&self) -> &HashSet<NodeId> {
        &self.visible_nodes
    }

    pub fn visible_edges(&self) -> &HashSet<EdgeId> {
        &self.visible_edges
    }

    /// The buffer-expanded rectangle of the most recent update, if any.
    pub fn last_expanded_bounds(&self) -> Option<BoundingBox> {
        self.last_expanded
    }

    pub fn last_update_cost_ms(&self) -> f32 {
        self.last_update_cost_ms
    }

    /// First tier whose threshold the zoom meets or exceeds; the table is
    /// sorted descending, so this picks the most detailed applicable tier.
    fn tier_for(&self, zoom: f32) -> LodTier {
        self.config
            .lod_tiers
            .iter()
            .find(|tier| zoom >= tier.min_zoom)
            .or_else(|| self.config.lod_tiers.last())
            .copied()
            .unwrap_or(PERMISSIVE_TIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use txlens_types::{GraphEdge, GraphNode};

    fn store_with_grid() -> GraphStore {
        let mut store = GraphStore::new(SpatialConfig::default());
        // 20x20 grid, levels cycling 0..=4.
        for i in 0..20 {
            for j in 0..20 {
                let level = ((i + j) % 5) as u8;
                let mut node =
                    GraphNode::new(format!("n_{}_{}", i, j), i as f32 * 50.0, j as f32 * 50.0, level);
                node.connections = vec![];
                store.index.insert(node);
            }
        }
        store
    }

    fn virtualizer() -> Virtualizer {
        Virtualizer::new(VirtualizerConfig::default())
    }

    #[test]
    fn full_zoom_keeps_all_levels_within_bound() {
        let mut store = store_with_grid();
        let mut virt = virtualizer();

        virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 1000.0, 1000.0, 1.0));
        assert!(!virt.visible_nodes().is_empty());
        assert!(virt.visible_nodes().len() <= 1000);

        // All levels present at zoom 1.0.
        let has_high_level = virt
            .visible_nodes()
            .iter()
            .any(|id| store.index.get(id).map(|n| n.level) == Some(4));
        assert!(has_high_level);
    }

    #[test]
    fn low_zoom_keeps_only_anchors_and_caps_count() {
        let mut store = store_with_grid();
        let mut virt = virtualizer();

        virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 1000.0, 1000.0, 0.1));
        assert!(virt.visible_nodes().len() <= 50);
        for id in virt.visible_nodes() {
            assert_eq!(store.index.get(id).map(|n| n.level), Some(0));
        }
    }

    #[test]
    fn visible_count_never_exceeds_tier_bound_at_any_zoom() {
        let mut store = store_with_grid();
        let config = VirtualizerConfig::default();
        let mut virt = Virtualizer::new(config.clone());

        for zoom in [2.0, 1.0, 0.7, 0.5, 0.3, 0.25, 0.15, 0.1, 0.05, 0.0] {
            virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 1000.0, 1000.0, zoom));
            let tier = config
                .lod_tiers
                .iter()
                .find(|t| zoom >= t.min_zoom)
                .unwrap_or(config.lod_tiers.last().unwrap());
            assert!(
                virt.visible_nodes().len() <= tier.max_nodes,
                "zoom {} exceeded tier bound",
                zoom
            );
        }
    }

    #[test]
    fn buffer_zone_pulls_in_nodes_just_outside_viewport() {
        let mut store = GraphStore::new(SpatialConfig::default());
        store.index.insert(GraphNode::new("edge_case", 1100.0, 50.0, 0));
        let mut virt = virtualizer();

        // Node is 100 units right of the viewport; buffer is 200.
        virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 1000.0, 1000.0, 1.0));
        assert!(virt.is_node_visible(&NodeId::new("edge_case")));
    }

    #[test]
    fn edge_visible_only_when_both_endpoints_visible() {
        let mut store = GraphStore::new(SpatialConfig::default());
        store.index.insert(GraphNode::new("in_a", 10.0, 10.0, 0));
        store.index.insert(GraphNode::new("in_b", 20.0, 20.0, 0));
        store.index.insert(GraphNode::new("far", 5000.0, 5000.0, 0));
        store
            .edges
            .insert(EdgeId::new("e_in"), GraphEdge::new("e_in", "in_a", "in_b"));
        store
            .edges
            .insert(EdgeId::new("e_out"), GraphEdge::new("e_out", "in_a", "far"));

        let mut virt = virtualizer();
        virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 100.0, 100.0, 1.0));

        assert!(virt.is_edge_visible(&EdgeId::new("e_in")));
        assert!(!virt.is_edge_visible(&EdgeId::new("e_out")));
        assert!(store.edges[&EdgeId::new("e_in")].is_visible);
        assert!(!store.edges[&EdgeId::new("e_out")].is_visible);
    }

    #[test]
    fn visibility_flags_flip_back_when_panning_away() {
        let mut store = GraphStore::new(SpatialConfig::default());
        store.index.insert(GraphNode::new("a", 10.0, 10.0, 0));
        let mut virt = virtualizer();
        let id = NodeId::new("a");

        virt.update_viewport(&mut store, Viewport::new(0.0, 0.0, 100.0, 100.0, 1.0));
        assert!(store.index.get(&id).unwrap().is_visible);
        let stamp = store.index.get(&id).unwrap().last_render_time_ms;
        assert!(stamp.is_some());

        virt.update_viewport(&mut store, Viewport::new(10_000.0, 10_000.0, 100.0, 100.0, 1.0));
        assert!(!virt.is_node_visible(&id));
        assert!(!store.index.get(&id).unwrap().is_visible);
        // Render stamp survives; it records the last time it was shown.
        assert_eq!(store.index.get(&id).unwrap().last_render_time_ms, stamp);
    }
}
