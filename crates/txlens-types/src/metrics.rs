//! Pull-based performance snapshot exposed to the host shell.

use serde::{Deserialize, Serialize};

/// Point-in-time engine metrics. Computed on request, never pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Nodes currently registered in the spatial index.
    pub node_count: usize,
    /// Edges currently registered.
    pub edge_count: usize,
    /// Cost of the most recent viewport update, in milliseconds.
    pub render_time_ms: f32,
    /// Chunk cache hits / (hits + misses) since session start; 0 when cold.
    pub cache_hit_ratio: f32,
    /// Chunks loaded per second over the recent window.
    pub data_streaming_rate: f32,
}
