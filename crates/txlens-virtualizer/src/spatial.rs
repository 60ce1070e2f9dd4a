//! Region-partitioning spatial index over node positions.
//!
//! A quadtree stored as an arena: regions live in a flat `Vec` and reference
//! their children by index, so there is no parent/child ownership cycle.
//! Node data itself is owned here once inserted; the virtualizer flips
//! visibility through [`SpatialIndex::mark_visibility`] and the streamer
//! only ever creates and removes whole chunks of nodes.

use std::collections::HashMap;

use txlens_types::{BoundingBox, GraphNode, NodeId};

use crate::config::SpatialConfig;

/// Index of a region within the arena. Region 0 is always the root.
type RegionIdx = u32;

#[derive(Debug)]
struct Region {
    bounds: BoundingBox,
    depth: usize,
    /// Node ids held directly by this region; empty for split regions
    /// except at `max_depth`, where leaves overflow instead of splitting.
    entries: Vec<NodeId>,
    children: Option<[RegionIdx; 4]>,
}

impl Region {
    fn leaf(bounds: BoundingBox, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }
}

/// Quadtree over 2D node positions with bounded depth.
#[derive(Debug)]
pub struct SpatialIndex {
    config: SpatialConfig,
    regions: Vec<Region>,
    nodes: HashMap<NodeId, GraphNode>,
}

impl SpatialIndex {
    pub fn new(config: SpatialConfig) -> Self {
        let root = Region::leaf(config.world_bounds, 0);
        Self {
            config,
            regions: vec![root],
            nodes: HashMap::new(),
        }
    }

    /// Insert a node, replacing any previous node with the same id
    /// (last-write-wins, so a stale fetch resolving late simply overwrites).
    pub fn insert(&mut self, node: GraphNode) {
        if self.nodes.contains_key(&node.id) {
            self.remove(&node.id);
        }

        let leaf = self.leaf_for(node.x, node.y);
        self.regions[leaf as usize].entries.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);

        let region = &self.regions[leaf as usize];
        if region.entries.len() > self.config.max_nodes_per_region
            && region.depth < self.config.max_depth
        {
            self.split(leaf);
        }
    }

    /// Remove a node by id, returning it if present. Linear scan within the
    /// owning leaf; ids are not separately indexed because removal is driven
    /// by whole-chunk expiry, not individual nodes.
    pub fn remove(&mut self, id: &NodeId) -> Option<GraphNode> {
        let node = self.nodes.remove(id)?;
        let leaf = self.leaf_for(node.x, node.y);
        let entries = &mut self.regions[leaf as usize].entries;
        if let Some(pos) = entries.iter().position(|e| e == id) {
            entries.remove(pos);
        }
        Some(node)
    }

    /// All nodes whose position lies inside `bounds` (inclusive edges).
    /// Recurses only into regions whose rectangle intersects the query.
    pub fn query(&self, bounds: &BoundingBox) -> Vec<&GraphNode> {
        let mut found = Vec::new();
        let mut stack = vec![0 as RegionIdx];

        while let Some(idx) = stack.pop() {
            let region = &self.regions[idx as usize];
            if !region.bounds.intersects(bounds) {
                continue;
            }
            if let Some(children) = region.children {
                stack.extend_from_slice(&children);
            }
            for id in &region.entries {
                if let Some(node) = self.nodes.get(id) {
                    if bounds.contains(node.x, node.y) {
                        found.push(node);
                    }
                }
            }
        }

        found
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains_id(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Flip a node's visibility flag and stamp its render time. The only
    /// mutation path into stored nodes besides insert/remove, which keeps
    /// positions stable relative to the partitioning.
    pub fn mark_visibility(
        &mut self,
        id: &NodeId,
        visible: bool,
        render_time_ms: Option<u64>,
    ) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.is_visible = visible;
                if let Some(stamp) = render_time_ms {
                    node.last_render_time_ms = Some(stamp);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Drop every node and collapse the tree back to a single root leaf.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.regions.push(Region::leaf(self.config.world_bounds, 0));
        self.nodes.clear();
    }

    /// Descend from the root to the leaf that owns position `(x, y)`.
    fn leaf_for(&self, x: f32, y: f32) -> RegionIdx {
        let mut idx: RegionIdx = 0;
        while let Some(children) = self.regions[idx as usize].children {
            idx = self.route(&children, x, y);
        }
        idx
    }

    /// Pick the child for a position: the first quadrant whose inclusive
    /// bounds contain it, in fixed order, so boundary points always land in
    /// exactly one region. Positions outside every child (outside the world
    /// bounds) go to the nearest child rectangle.
    fn route(&self, children: &[RegionIdx; 4], x: f32, y: f32) -> RegionIdx {
        for &child in children {
            if self.regions[child as usize].bounds.contains(x, y) {
                return child;
            }
        }

        let mut best = children[0];
        let mut best_dist = f32::INFINITY;
        for &child in children {
            let b = &self.regions[child as usize].bounds;
            let dx = (b.min_x - x).max(0.0).max(x - b.max_x);
            let dy = (b.min_y - y).max(0.0).max(y - b.max_y);
            let dist = dx * dx + dy * dy;
            if dist < best_dist {
                best = child;
                best_dist = dist;
            }
        }
        best
    }

    /// Split a leaf into four equal quadrants and redistribute its entries.
    fn split(&mut self, idx: RegionIdx) {
        let (bounds, depth) = {
            let region = &self.regions[idx as usize];
            (region.bounds, region.depth)
        };
        let (cx, cy) = bounds.center();

        let quadrants = [
            BoundingBox::new(bounds.min_x, bounds.min_y, cx, cy),
            BoundingBox::new(cx, bounds.min_y, bounds.max_x, cy),
            BoundingBox::new(bounds.min_x, cy, cx, bounds.max_y),
            BoundingBox::new(cx, cy, bounds.max_x, bounds.max_y),
        ];

        let base = self.regions.len() as RegionIdx;
        for quadrant in quadrants {
            self.regions.push(Region::leaf(quadrant, depth + 1));
        }
        let children = [base, base + 1, base + 2, base + 3];

        let entries = std::mem::take(&mut self.regions[idx as usize].entries);
        self.regions[idx as usize].children = Some(children);

        for id in entries {
            let (x, y) = match self.nodes.get(&id) {
                Some(node) => (node.x, node.y),
                None => continue,
            };
            let child = self.route(&children, x, y);
            self.regions[child as usize].entries.push(id);
        }
    }
}
