//! Shared boundary types for the txlens virtualization engine.
//!
//! Everything that crosses a boundary (engine to rendering shell, engine to
//! chunk data source) lives here so both sides agree on one serialized
//! shape. No async, no I/O, no engine logic.

pub mod chunk;
pub mod geometry;
pub mod graph;
pub mod metrics;
pub mod operation;

pub use chunk::{ChunkId, ChunkPayload, ChunkState, DataChunk};
pub use geometry::{BoundingBox, Viewport};
pub use graph::{CircularReference, EdgeId, GraphEdge, GraphNode, NodeId};
pub use metrics::PerformanceMetrics;
pub use operation::{NetworkFailureContext, Operation, OperationKind, OperationStatus};
