//! # Dendrite - HTM connections graph and sequence memory
//!
//! Dendrite implements the learning substrate of Hierarchical Temporal Memory:
//! a mutable, pruning graph of synaptic connections between cells, and the
//! Temporal Memory sequence engine that predicts, bursts and learns on top of it.
//!
//! ## Overview
//!
//! - **[`Connections`](algorithms::Connections)**: the cell → segment → synapse
//!   graph. Owns segment/synapse lifecycle, Hebbian adaptation and the activity
//!   computation over a reverse presynaptic index.
//! - **[`TemporalMemory`](algorithms::TemporalMemory)**: the two-phase
//!   predict/learn state machine over columns of cells, with bursting and raw
//!   anomaly scoring.
//! - **[`Sdr`](types::Sdr)**: the sparse binary vector consumed and produced by both.
//!
//! ## Quick Start
//!
//! ```rust
//! use dendrite::prelude::*;
//!
//! let mut tm = TemporalMemory::new(TemporalMemoryParams {
//!     column_dimensions: vec![64],
//!     cells_per_column: 4,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let mut columns = Sdr::new(&[64]);
//! columns.set_sparse(&[1, 5, 10, 20]).unwrap();
//!
//! tm.compute(&columns, true).unwrap();
//! assert_eq!(tm.anomaly(), 1.0); // nothing was predicted yet
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): model persistence in binary (bincode) and JSON formats
//! - `rayon`: parallel activity computation for large inputs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod algorithms;
pub mod types;
pub mod utils;

#[cfg(feature = "serde")]
pub mod serialization;

/// Re-export of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::algorithms::{
        compute_raw_anomaly_score, Connections, ConnectionsParams, SegmentActivity,
        SegmentEviction, TemporalMemory, TemporalMemoryParams, DEFAULT_SEGMENT_EVICTION,
    };
    pub use crate::types::{
        CellIdx, Permanence, Real, Sdr, Segment, SegmentIdx, Synapse, SynapseIdx, UInt,
    };
    pub use crate::utils::Random;

    #[cfg(feature = "serde")]
    pub use crate::serialization::{Serializable, SerializableFormat};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for dendrite operations.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum DendriteError {
        /// Out-of-range index, zero-valued required parameter or malformed input.
        #[error("Invalid argument '{name}': {message}")]
        InvalidArgument {
            /// Name of the offending argument.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// The handle refers to a segment or synapse that has been destroyed.
        #[error("{entity} {index} not found (already destroyed)")]
        NotFound {
            /// Kind of entity ("segment" or "synapse").
            entity: &'static str,
            /// The stale handle.
            index: u32,
        },

        /// Dimension mismatch between SDRs or other structures.
        #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
        DimensionMismatch {
            /// Expected dimensions.
            expected: Vec<u32>,
            /// Actual dimensions.
            actual: Vec<u32>,
        },

        /// SDR data is invalid (e.g., unsorted sparse indices).
        #[error("Invalid SDR data: {0}")]
        InvalidSdrData(String),

        /// Serialization error.
        #[cfg(feature = "serde")]
        #[error("Serialization error: {message}")]
        SerializationError {
            /// Description of the serialization error.
            message: String,
        },

        /// I/O error.
        #[error("I/O error: {message}")]
        IoError {
            /// Description of the I/O error.
            message: String,
        },
    }

    /// Result type alias using `DendriteError`.
    pub type Result<T> = std::result::Result<T, DendriteError>;
}

pub use error::{DendriteError, Result};
