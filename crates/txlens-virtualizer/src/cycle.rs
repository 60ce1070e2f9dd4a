//! Cycle detection and resolution for graph traversals.
//!
//! Traversals carry their path explicitly; revisiting a node on that path
//! is a cycle. Resolution looks for an alternate route that avoids the
//! direct edge which closed the cycle, bounded by a configured depth.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;
use txlens_types::{CircularReference, NodeId};

/// Check whether stepping onto `node_id` closes a cycle over `path`.
///
/// The returned record carries the cycle itself: the slice of `path` from
/// the first occurrence of `node_id` onward, and its length as the depth.
pub fn detect_circular_reference(node_id: &NodeId, path: &[NodeId]) -> Option<CircularReference> {
    let first = path.iter().position(|id| id == node_id)?;
    let cycle: Vec<NodeId> = path[first..].to_vec();
    debug!(node = %node_id, depth = cycle.len(), "circular reference detected");
    Some(CircularReference {
        node_id: node_id.clone(),
        depth: cycle.len(),
        path: cycle,
    })
}

/// Find an alternate route from `start` to `target` that does not use the
/// direct `start -> target` edge, up to `max_depth` edges long.
///
/// Breadth-first, so the shortest such detour wins. Returns the full node
/// path including both endpoints, or `None` when no detour exists within
/// the bound.
pub fn break_circular_reference(
    start: &NodeId,
    target: &NodeId,
    adjacency: &HashMap<NodeId, Vec<NodeId>>,
    max_depth: usize,
) -> Option<Vec<NodeId>> {
    if start == target || max_depth == 0 {
        return None;
    }

    let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::from([start.clone()]);
    let mut frontier: VecDeque<(NodeId, usize)> = VecDeque::from([(start.clone(), 0)]);

    while let Some((current, depth)) = frontier.pop_front() {
        if depth == max_depth {
            continue;
        }
        for neighbor in adjacency.get(&current).into_iter().flatten() {
            // The direct edge is the one being broken.
            if current == *start && neighbor == target {
                continue;
            }
            if !visited.insert(neighbor.clone()) {
                continue;
            }
            parents.insert(neighbor.clone(), current.clone());

            if neighbor == target {
                let mut route = vec![target.clone()];
                let mut cursor = target;
                while let Some(parent) = parents.get(cursor) {
                    route.push(parent.clone());
                    cursor = parent;
                }
                route.reverse();
                debug!(
                    start = %start,
                    target = %target,
                    hops = route.len() - 1,
                    "alternate route found"
                );
                return Some(route);
            }
            frontier.push_back((neighbor.clone(), depth + 1));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<NodeId, Vec<NodeId>> {
        edges
            .iter()
            .map(|(from, to)| (NodeId::new(*from), ids(to)))
            .collect()
    }

    #[test]
    fn revisiting_path_head_is_a_full_cycle() {
        let path = ids(&["A", "B", "C"]);
        let cycle = detect_circular_reference(&NodeId::new("A"), &path).unwrap();
        assert_eq!(cycle.depth, 3);
        assert_eq!(cycle.path, ids(&["A", "B", "C"]));
        assert_eq!(cycle.node_id, NodeId::new("A"));
    }

    #[test]
    fn revisiting_mid_path_yields_suffix_cycle() {
        let path = ids(&["A", "B", "C", "D"]);
        let cycle = detect_circular_reference(&NodeId::new("C"), &path).unwrap();
        assert_eq!(cycle.depth, 2);
        assert_eq!(cycle.path, ids(&["C", "D"]));
    }

    #[test]
    fn unvisited_node_is_not_a_cycle() {
        let path = ids(&["A", "B", "C"]);
        assert!(detect_circular_reference(&NodeId::new("D"), &path).is_none());
        assert!(detect_circular_reference(&NodeId::new("A"), &[]).is_none());
    }

    #[test]
    fn detour_avoids_the_direct_edge() {
        // A -> B directly, and A -> X -> B around it.
        let adjacency = graph(&[
            ("A", &["B", "X"]),
            ("X", &["B"]),
            ("B", &[]),
        ]);
        let route =
            break_circular_reference(&NodeId::new("A"), &NodeId::new("B"), &adjacency, 10);
        assert_eq!(route, Some(ids(&["A", "X", "B"])));
    }

    #[test]
    fn shortest_detour_wins() {
        let adjacency = graph(&[
            ("A", &["B", "X", "P"]),
            ("X", &["Y"]),
            ("Y", &["B"]),
            ("P", &["B"]),
            ("B", &[]),
        ]);
        let route =
            break_circular_reference(&NodeId::new("A"), &NodeId::new("B"), &adjacency, 10)
                .unwrap();
        assert_eq!(route.len(), 3);
        assert_eq!(route.first(), Some(&NodeId::new("A")));
        assert_eq!(route.last(), Some(&NodeId::new("B")));
    }

    #[test]
    fn depth_bound_cuts_off_long_detours() {
        // Only route is 3 edges long: A -> X -> Y -> B.
        let adjacency = graph(&[
            ("A", &["B", "X"]),
            ("X", &["Y"]),
            ("Y", &["B"]),
            ("B", &[]),
        ]);
        let start = NodeId::new("A");
        let target = NodeId::new("B");
        assert!(break_circular_reference(&start, &target, &adjacency, 2).is_none());
        assert!(break_circular_reference(&start, &target, &adjacency, 3).is_some());
    }

    #[test]
    fn no_detour_when_only_the_direct_edge_exists() {
        let adjacency = graph(&[("A", &["B"]), ("B", &["A"])]);
        // B -> A exists but edges are directed; there is no A -> B detour.
        assert!(
            break_circular_reference(&NodeId::new("A"), &NodeId::new("B"), &adjacency, 10)
                .is_none()
        );
    }

    #[test]
    fn degenerate_inputs_return_none() {
        let adjacency = graph(&[("A", &["B"])]);
        let a = NodeId::new("A");
        assert!(break_circular_reference(&a, &a, &adjacency, 10).is_none());
        assert!(break_circular_reference(&a, &NodeId::new("B"), &adjacency, 0).is_none());
    }
}
