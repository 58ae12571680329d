//! Primitive type definitions shared by the connections graph and Temporal Memory.
//!
//! Segments and synapses are addressed by flat integer handles into arenas owned by
//! [`Connections`](crate::algorithms::Connections), never by references.

/// 32-bit unsigned integer.
pub type UInt32 = u32;

/// Default unsigned integer type.
pub type UInt = UInt32;

/// 32-bit floating point number.
pub type Real32 = f32;

/// Default floating point type.
pub type Real = Real32;

/// Index of a cell in the connections graph.
/// Must match `ElemSparse` so cell sets can be carried in an [`Sdr`](crate::types::Sdr).
pub type CellIdx = UInt32;

/// Count or position of segments on one cell.
pub type SegmentIdx = u16;

/// Count or position of synapses on one segment.
pub type SynapseIdx = u16;

/// Handle of a segment in the connections arena.
pub type Segment = UInt32;

/// Handle of a synapse in the connections arena.
pub type Synapse = UInt32;

/// Synapse permanence value, kept within `[MIN_PERMANENCE, MAX_PERMANENCE]`.
pub type Permanence = Real32;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Tolerance used when deciding that a permanence has decayed to zero.
pub const EPSILON: Permanence = 1e-6;

/// Element type for dense SDR representation.
pub type ElemDense = u8;

/// Element type for sparse SDR representation (indices).
pub type ElemSparse = UInt32;
