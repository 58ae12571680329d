//! Core types.
//!
//! Index and permanence aliases used by the connections graph, and the SDR
//! (Sparse Distributed Representation) that carries active cell and column sets.

mod primitives;
mod sdr;

pub use primitives::*;
pub use sdr::*;
