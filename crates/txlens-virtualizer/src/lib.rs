//! Graph virtualization engine for very large account/transaction graphs.
//!
//! Rendering shells hand this crate a viewport and a [`streamer::DataSource`];
//! the engine keeps only the relevant slice of the graph in memory:
//!
//! - [`spatial::SpatialIndex`] answers rectangle queries over loaded nodes,
//! - [`virtualizer::Virtualizer`] derives the visible set per pan/zoom,
//! - [`streamer::ChunkStreamer`] pages graph data in and out by grid cell,
//! - [`tracker::OperationTracker`] arbitrates competing logical operations,
//! - [`cycle`] detects and routes around traversal cycles.
//!
//! [`session::GraphSession`] wires them together; hosts usually start there.

pub mod config;
pub mod cycle;
pub mod error;
pub mod retry;
pub mod session;
pub mod spatial;
pub mod store;
pub mod streamer;
pub mod tracker;
pub mod virtualizer;

pub use config::{EngineConfig, SpatialConfig, StreamerConfig, TrackerConfig, VirtualizerConfig};
pub use cycle::{break_circular_reference, detect_circular_reference};
pub use error::{NetworkError, QueueError};
pub use retry::{FetchClient, RetryPolicy};
pub use session::GraphSession;
pub use spatial::SpatialIndex;
pub use store::GraphStore;
pub use streamer::{ChunkStreamer, DataSource};
pub use tracker::{OperationHandle, OperationTracker};
pub use virtualizer::Virtualizer;
