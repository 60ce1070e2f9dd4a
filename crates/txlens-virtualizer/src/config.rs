//! Engine configuration. Every knob has a production default; tests tighten
//! them to keep runs fast and deterministic.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use txlens_types::BoundingBox;

use crate::retry::RetryPolicy;

/// Spatial index (quadtree) tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Leaf capacity before a region splits into quadrants.
    pub max_nodes_per_region: usize,
    /// Depth bound; leaves at this depth overflow instead of splitting.
    pub max_depth: usize,
    /// Root region. Nodes outside it are routed to the nearest edge region,
    /// so layouts should stay within these bounds for precise queries.
    pub world_bounds: BoundingBox,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_region: 50,
            max_depth: 8,
            world_bounds: BoundingBox::new(-1.0e6, -1.0e6, 1.0e6, 1.0e6),
        }
    }
}

/// One level-of-detail tier. The first tier whose `min_zoom` the current
/// zoom meets or exceeds wins, so the table must be sorted descending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodTier {
    pub min_zoom: f32,
    /// Hard bound on visible nodes at this tier.
    pub max_nodes: usize,
    /// Nodes with `level > skip_level` are dropped; level 0 always survives.
    pub skip_level: u8,
}

/// Viewport virtualizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualizerConfig {
    /// Margin added around the literal viewport to avoid edge pop-in.
    pub buffer_zone: f32,
    pub lod_tiers: Vec<LodTier>,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            buffer_zone: 200.0,
            lod_tiers: vec![
                LodTier {
                    min_zoom: 1.0,
                    max_nodes: 1000,
                    skip_level: u8::MAX,
                },
                LodTier {
                    min_zoom: 0.5,
                    max_nodes: 500,
                    skip_level: 4,
                },
                LodTier {
                    min_zoom: 0.25,
                    max_nodes: 200,
                    skip_level: 2,
                },
                LodTier {
                    min_zoom: 0.1,
                    max_nodes: 50,
                    skip_level: 0,
                },
                LodTier {
                    min_zoom: 0.0,
                    max_nodes: 20,
                    skip_level: 0,
                },
            ],
        }
    }
}

/// Chunk streamer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Side length of one grid cell, in layout units.
    pub chunk_size: f32,
    /// Extra cells fetched around the viewport in every direction.
    pub prefetch_distance: i64,
    /// Cap on simultaneously in-flight chunk fetches.
    pub max_concurrent_chunks: usize,
    /// Loaded chunks older than this are evicted by the sweep.
    pub cache_expiration: Duration,
    /// Hard per-attempt bound on a chunk fetch.
    pub network_timeout: Duration,
    pub retry: RetryPolicy,
    /// Window over which the streaming-rate metric is computed.
    pub streaming_rate_window: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100.0,
            prefetch_distance: 2,
            max_concurrent_chunks: 4,
            cache_expiration: Duration::from_secs(300),
            network_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            streaming_rate_window: Duration::from_secs(60),
        }
    }
}

/// Operation tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Pending operations never completed within this window auto-fail.
    pub operation_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level engine configuration, one per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub spatial: SpatialConfig,
    pub virtualizer: VirtualizerConfig,
    pub streamer: StreamerConfig,
    pub tracker: TrackerConfig,
    /// Depth bound for alternate-path search when breaking cycles.
    pub max_circular_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spatial: SpatialConfig::default(),
            virtualizer: VirtualizerConfig::default(),
            streamer: StreamerConfig::default(),
            tracker: TrackerConfig::default(),
            max_circular_depth: 10,
        }
    }
}
