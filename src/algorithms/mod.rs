//! HTM algorithms implementation.
//!
//! - **Connections**: the synaptic connectivity graph
//! - **Temporal Memory**: learns sequences on top of one graph
//! - **Anomaly**: raw anomaly score of a step

mod anomaly;
mod connections;
mod temporal_memory;

pub use anomaly::compute_raw_anomaly_score;
pub use connections::{
    CellData, Connections, ConnectionsParams, SegmentActivity, SegmentData, SegmentEviction,
    SynapseData, DEFAULT_SEGMENT_EVICTION,
};
pub use temporal_memory::{TemporalMemory, TemporalMemoryParams};
