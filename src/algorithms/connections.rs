//! Connections - the synaptic connectivity graph.
//!
//! A [`Connections`] instance stores a flat address space of cells, the dendrite
//! segments each cell owns, and the synapses on each segment. Segments and synapses
//! live in arenas and are addressed by integer handles; destroying one frees its
//! slot for reuse without disturbing any other handle.
//!
//! The graph knows nothing about columns, bursting or anomaly. It offers lifecycle
//! operations, Hebbian adaptation and the activity computation, which walks a
//! reverse presynaptic-cell → synapse index so its cost is proportional to the
//! active input's fan-out rather than to the total number of segments.

use crate::error::{DendriteError, Result};
use crate::types::{
    CellIdx, Permanence, Sdr, Segment, SegmentIdx, Synapse, SynapseIdx, EPSILON,
    MAX_PERMANENCE, MIN_PERMANENCE,
};
use crate::utils::Random;

use ahash::AHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Synapses one segment can hold; per-segment counts are [`SynapseIdx`].
const MAX_SYNAPSES_PER_SEGMENT: usize = SynapseIdx::MAX as usize;

/// Minimum active input size before the `rayon` feature splits activity work.
#[cfg(feature = "rayon")]
const PARALLEL_MIN_ACTIVE: usize = 512;

/// Which segment a full cell gives up when a new segment is created on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentEviction {
    /// The segment created earliest.
    Oldest,
    /// The segment whose last adaptation lies furthest in the past.
    LeastRecentlyUsed,
    /// The segment holding the fewest synapses.
    FewestSynapses,
}

/// Eviction policy used unless [`ConnectionsParams::segment_eviction`] says otherwise.
pub const DEFAULT_SEGMENT_EVICTION: SegmentEviction = SegmentEviction::Oldest;

impl Default for SegmentEviction {
    fn default() -> Self {
        DEFAULT_SEGMENT_EVICTION
    }
}

/// Data associated with a synapse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseData {
    /// The presynaptic cell this synapse receives input from.
    pub presynaptic_cell: CellIdx,

    /// The permanence strength of this synapse.
    pub permanence: Permanence,

    /// The segment this synapse belongs to.
    pub segment: Segment,

    destroyed: bool,
}

impl SynapseData {
    fn new(presynaptic_cell: CellIdx, permanence: Permanence, segment: Segment) -> Self {
        Self {
            presynaptic_cell,
            permanence,
            segment,
            destroyed: false,
        }
    }
}

/// Data associated with a segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentData {
    /// The synapses on this segment, in creation order.
    pub synapses: SmallVec<[Synapse; 16]>,

    /// The cell this segment belongs to.
    pub cell: CellIdx,

    /// Number of connected synapses (permanence >= threshold).
    pub num_connected: SynapseIdx,

    /// Iteration at which this segment was created or last adapted.
    pub last_used: u32,

    /// Creation order across the whole graph; smaller is older.
    pub ordinal: u64,

    destroyed: bool,
}

impl SegmentData {
    fn new(cell: CellIdx, iteration: u32, ordinal: u64) -> Self {
        Self {
            synapses: SmallVec::new(),
            cell,
            num_connected: 0,
            last_used: iteration,
            ordinal,
            destroyed: false,
        }
    }
}

/// Data associated with a cell.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellData {
    /// The segments on this cell, oldest first.
    pub segments: SmallVec<[Segment; 8]>,
}

/// Parameters for creating a Connections instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionsParams {
    /// Number of cells; valid cell indices are `0..num_cells`.
    pub num_cells: CellIdx,

    /// Permanence at or above which a synapse counts as connected.
    pub connected_threshold: Permanence,

    /// Track per-synapse updates so that `adapt_segment` does not repeat the
    /// same learning step on consecutive cycles. For slowly changing time series.
    pub timeseries: bool,

    /// Which segment to evict when a cell reaches its segment cap.
    pub segment_eviction: SegmentEviction,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_cells: 0,
            connected_threshold: 0.5,
            timeseries: false,
            segment_eviction: DEFAULT_SEGMENT_EVICTION,
        }
    }
}

/// Per-segment activity counts produced by [`Connections::compute_segment_activity`].
///
/// Both vectors are indexed by segment handle and have length
/// [`Connections::segment_flat_list_length`]. Destroyed slots count zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentActivity {
    /// Active synapses at or above the connected threshold.
    pub connected: Vec<SynapseIdx>,
    /// Active synapses of any permanence.
    pub potential: Vec<SynapseIdx>,
}

impl SegmentActivity {
    fn zeroed(len: usize) -> Self {
        Self {
            connected: vec![0; len],
            potential: vec![0; len],
        }
    }

    #[cfg(feature = "rayon")]
    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.connected.iter_mut().zip(&other.connected) {
            *a = a.saturating_add(*b);
        }
        for (a, b) in self.potential.iter_mut().zip(&other.potential) {
            *a = a.saturating_add(*b);
        }
        self
    }
}

/// The synaptic connectivity graph.
///
/// # Example
///
/// ```rust
/// use dendrite::algorithms::{Connections, ConnectionsParams};
///
/// let mut conn = Connections::new(ConnectionsParams {
///     num_cells: 4096,
///     connected_threshold: 0.51,
///     ..Default::default()
/// });
///
/// let seg = conn.create_segment(4095, 1).unwrap();
/// let syn = conn.create_synapse(seg, 4095, 0.52).unwrap();
///
/// // creating the same synapse again keeps the higher permanence
/// assert_eq!(conn.create_synapse(seg, 4095, 0.11).unwrap(), syn);
/// assert_eq!(conn.permanence_for_synapse(syn), 0.52);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connections {
    cells: Vec<CellData>,

    segments: Vec<SegmentData>,
    destroyed_segments: Vec<Segment>,

    synapses: Vec<SynapseData>,
    destroyed_synapses: Vec<Synapse>,

    connected_threshold: Permanence,
    segment_eviction: SegmentEviction,

    /// Advanced once per cycle by `tick`.
    iteration: u32,
    next_segment_ordinal: u64,

    // Reverse index: presynaptic cell -> synapses. The connected map holds the
    // subset whose permanence is at or above the threshold.
    potential_synapses_for_presynaptic_cell: AHashMap<CellIdx, Vec<Synapse>>,
    connected_synapses_for_presynaptic_cell: AHashMap<CellIdx, Vec<Synapse>>,

    timeseries: bool,
    previous_updates: Vec<Permanence>,
    current_updates: Vec<Permanence>,

    pruned_synapses: usize,
    pruned_segments: usize,
}

impl Connections {
    /// Creates an empty graph over `params.num_cells` cells.
    pub fn new(params: ConnectionsParams) -> Self {
        Self {
            cells: vec![CellData::default(); params.num_cells as usize],
            segments: Vec::new(),
            destroyed_segments: Vec::new(),
            synapses: Vec::new(),
            destroyed_synapses: Vec::new(),
            connected_threshold: params.connected_threshold,
            segment_eviction: params.segment_eviction,
            iteration: 0,
            next_segment_ordinal: 0,
            potential_synapses_for_presynaptic_cell: AHashMap::new(),
            connected_synapses_for_presynaptic_cell: AHashMap::new(),
            timeseries: params.timeseries,
            previous_updates: Vec::new(),
            current_updates: Vec::new(),
            pruned_synapses: 0,
            pruned_segments: 0,
        }
    }

    /// Creates a graph with default parameters.
    pub fn with_cells(num_cells: CellIdx) -> Self {
        Self::new(ConnectionsParams {
            num_cells,
            ..Default::default()
        })
    }

    /// Returns the number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the connected threshold.
    #[inline]
    pub fn connected_threshold(&self) -> Permanence {
        self.connected_threshold
    }

    /// Returns the eviction policy for full cells.
    #[inline]
    pub fn segment_eviction(&self) -> SegmentEviction {
        self.segment_eviction
    }

    /// Returns the current iteration count.
    #[inline]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Returns true if time-series mode is enabled.
    #[inline]
    pub fn timeseries(&self) -> bool {
        self.timeseries
    }

    /// Returns the number of live segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len() - self.destroyed_segments.len()
    }

    /// Returns the number of segments on `cell`.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is out of range.
    pub fn num_segments_on_cell(&self, cell: CellIdx) -> usize {
        self.cells[cell as usize].segments.len()
    }

    /// Returns the number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapses.len() - self.destroyed_synapses.len()
    }

    /// Returns the number of synapses on `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    pub fn num_synapses_on_segment(&self, segment: Segment) -> usize {
        self.segments[segment as usize].synapses.len()
    }

    /// Returns the number of connected synapses on `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    pub fn num_connected_synapses(&self, segment: Segment) -> usize {
        self.segments[segment as usize].num_connected as usize
    }

    /// Returns the length of a vector indexed by segment handle.
    pub fn segment_flat_list_length(&self) -> usize {
        self.segments.len()
    }

    /// Number of synapses removed because adaptation drove them to zero.
    pub fn pruned_synapses(&self) -> usize {
        self.pruned_synapses
    }

    /// Number of segments removed by adaptation or by eviction from a full cell.
    pub fn pruned_segments(&self) -> usize {
        self.pruned_segments
    }

    // ========================================================================
    // Handle validation
    // ========================================================================

    fn check_cell(&self, cell: CellIdx, name: &'static str) -> Result<()> {
        if (cell as usize) < self.cells.len() {
            Ok(())
        } else {
            Err(DendriteError::InvalidArgument {
                name,
                message: format!("cell {cell} out of range (num_cells = {})", self.cells.len()),
            })
        }
    }

    fn check_segment(&self, segment: Segment) -> Result<()> {
        match self.segments.get(segment as usize) {
            None => Err(DendriteError::InvalidArgument {
                name: "segment",
                message: format!(
                    "segment {segment} out of range (flat list length = {})",
                    self.segments.len()
                ),
            }),
            Some(data) if data.destroyed => Err(DendriteError::NotFound {
                entity: "segment",
                index: segment,
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_synapse(&self, synapse: Synapse) -> Result<()> {
        match self.synapses.get(synapse as usize) {
            None => Err(DendriteError::InvalidArgument {
                name: "synapse",
                message: format!(
                    "synapse {synapse} out of range (flat list length = {})",
                    self.synapses.len()
                ),
            }),
            Some(data) if data.destroyed => Err(DendriteError::NotFound {
                entity: "synapse",
                index: synapse,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Returns true if `segment` refers to a live segment.
    pub fn segment_exists(&self, segment: Segment) -> bool {
        self.check_segment(segment).is_ok()
    }

    /// Returns true if `synapse` refers to a live synapse.
    pub fn synapse_exists(&self, synapse: Synapse) -> bool {
        self.check_synapse(synapse).is_ok()
    }

    // ========================================================================
    // Segment operations
    // ========================================================================

    /// Creates a new segment on `cell`.
    ///
    /// If the cell already owns `max_segments_per_cell` segments, segments are
    /// evicted according to the configured [`SegmentEviction`] policy until there
    /// is room. The new segment starts with no synapses.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `cell` is out of range or `max_segments_per_cell` is 0.
    pub fn create_segment(
        &mut self,
        cell: CellIdx,
        max_segments_per_cell: SegmentIdx,
    ) -> Result<Segment> {
        self.check_cell(cell, "cell")?;
        if max_segments_per_cell == 0 {
            return Err(DendriteError::InvalidArgument {
                name: "max_segments_per_cell",
                message: "Must be > 0".to_string(),
            });
        }

        while self.cells[cell as usize].segments.len() >= max_segments_per_cell as usize {
            let Some(victim) = self.eviction_candidate(cell) else {
                break;
            };
            log::debug!(
                "cell {cell} reached {max_segments_per_cell} segments, evicting segment {victim} ({:?})",
                self.segment_eviction
            );
            self.destroy_segment_unchecked(victim);
            self.pruned_segments += 1;
        }

        let data = SegmentData::new(cell, self.iteration, self.next_segment_ordinal);
        self.next_segment_ordinal += 1;

        let segment = if let Some(reuse) = self.destroyed_segments.pop() {
            self.segments[reuse as usize] = data;
            reuse
        } else {
            self.segments.push(data);
            (self.segments.len() - 1) as Segment
        };

        self.cells[cell as usize].segments.push(segment);
        Ok(segment)
    }

    fn eviction_candidate(&self, cell: CellIdx) -> Option<Segment> {
        let segments = self.cells[cell as usize].segments.iter().copied();
        let data = |s: Segment| &self.segments[s as usize];

        match self.segment_eviction {
            SegmentEviction::Oldest => segments.min_by_key(|&s| data(s).ordinal),
            SegmentEviction::LeastRecentlyUsed => {
                segments.min_by_key(|&s| (data(s).last_used, data(s).ordinal))
            }
            SegmentEviction::FewestSynapses => {
                segments.min_by_key(|&s| (data(s).synapses.len(), data(s).ordinal))
            }
        }
    }

    /// Destroys a segment together with all of its synapses.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if already destroyed.
    pub fn destroy_segment(&mut self, segment: Segment) -> Result<()> {
        self.check_segment(segment)?;
        self.destroy_segment_unchecked(segment);
        Ok(())
    }

    fn destroy_segment_unchecked(&mut self, segment: Segment) {
        let synapses = std::mem::take(&mut self.segments[segment as usize].synapses);
        for synapse in synapses {
            self.release_synapse(synapse);
        }

        let data = &mut self.segments[segment as usize];
        data.num_connected = 0;
        data.destroyed = true;
        let cell = data.cell;

        let cell_segments = &mut self.cells[cell as usize].segments;
        if let Some(pos) = cell_segments.iter().position(|&s| s == segment) {
            cell_segments.remove(pos);
        }

        self.destroyed_segments.push(segment);
    }

    /// Gets the segments for a cell, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is out of range.
    #[inline]
    pub fn segments_for_cell(&self, cell: CellIdx) -> &[Segment] {
        &self.cells[cell as usize].segments
    }

    /// Gets the cell that owns a segment.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    #[inline]
    pub fn cell_for_segment(&self, segment: Segment) -> CellIdx {
        self.segments[segment as usize].cell
    }

    /// Gets the segment data.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    #[inline]
    pub fn data_for_segment(&self, segment: Segment) -> &SegmentData {
        &self.segments[segment as usize]
    }

    /// Gets the position of a live segment within its cell's segment list.
    pub fn idx_on_cell_for_segment(&self, segment: Segment) -> Option<SegmentIdx> {
        let cell = self.segments.get(segment as usize)?.cell;
        self.cells[cell as usize]
            .segments
            .iter()
            .position(|&s| s == segment)
            .map(|p| p as SegmentIdx)
    }

    /// Orders segments by owning cell, then by age on that cell.
    ///
    /// # Panics
    ///
    /// Panics if either handle is out of range.
    pub fn compare_segments(&self, a: Segment, b: Segment) -> Ordering {
        let (a, b) = (&self.segments[a as usize], &self.segments[b as usize]);
        a.cell.cmp(&b.cell).then_with(|| a.ordinal.cmp(&b.ordinal))
    }

    // ========================================================================
    // Synapse operations
    // ========================================================================

    /// Creates a synapse on `segment` from `presynaptic_cell`.
    ///
    /// At most one synapse per presynaptic cell exists on a segment. If one is
    /// already present its permanence becomes `max(existing, permanence)` and its
    /// handle is returned. New permanences are clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range segment or presynaptic cell, a NaN
    /// permanence, or a new synapse on a segment already holding
    /// `SynapseIdx::MAX` synapses. `NotFound` if the segment was destroyed.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: CellIdx,
        permanence: Permanence,
    ) -> Result<Synapse> {
        self.check_segment(segment)?;
        self.check_cell(presynaptic_cell, "presynaptic_cell")?;
        if permanence.is_nan() {
            return Err(DendriteError::InvalidArgument {
                name: "permanence",
                message: "NaN".to_string(),
            });
        }
        if self.existing_synapse(segment, presynaptic_cell).is_none()
            && self.segments[segment as usize].synapses.len() >= MAX_SYNAPSES_PER_SEGMENT
        {
            return Err(DendriteError::InvalidArgument {
                name: "segment",
                message: format!(
                    "segment {segment} already holds {MAX_SYNAPSES_PER_SEGMENT} synapses"
                ),
            });
        }
        Ok(self.create_synapse_unchecked(segment, presynaptic_cell, permanence))
    }

    /// Looks up the synapse from `presynaptic_cell` on `segment` through the
    /// reverse index, so the cost follows the cell's fan-out.
    fn existing_synapse(&self, segment: Segment, presynaptic_cell: CellIdx) -> Option<Synapse> {
        self.synapses_for_presynaptic_cell(presynaptic_cell)
            .iter()
            .copied()
            .find(|&s| self.synapses[s as usize].segment == segment)
    }

    fn create_synapse_unchecked(
        &mut self,
        segment: Segment,
        presynaptic_cell: CellIdx,
        permanence: Permanence,
    ) -> Synapse {
        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);

        if let Some(existing) = self.existing_synapse(segment, presynaptic_cell) {
            if permanence > self.synapses[existing as usize].permanence {
                self.update_permanence_unchecked(existing, permanence);
            }
            return existing;
        }

        let data = SynapseData::new(presynaptic_cell, permanence, segment);
        let synapse = if let Some(reuse) = self.destroyed_synapses.pop() {
            self.synapses[reuse as usize] = data;
            reuse
        } else {
            self.synapses.push(data);
            (self.synapses.len() - 1) as Synapse
        };

        // A reused slot must not inherit the previous occupant's update history.
        for history in [&mut self.previous_updates, &mut self.current_updates] {
            if let Some(update) = history.get_mut(synapse as usize) {
                *update = 0.0;
            }
        }

        self.segments[segment as usize].synapses.push(synapse);
        self.potential_synapses_for_presynaptic_cell
            .entry(presynaptic_cell)
            .or_default()
            .push(synapse);

        if permanence >= self.connected_threshold {
            self.segments[segment as usize].num_connected += 1;
            self.connected_synapses_for_presynaptic_cell
                .entry(presynaptic_cell)
                .or_default()
                .push(synapse);
        }

        synapse
    }

    /// Destroys a synapse.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if already destroyed.
    pub fn destroy_synapse(&mut self, synapse: Synapse) -> Result<()> {
        self.check_synapse(synapse)?;
        self.destroy_synapse_unchecked(synapse);
        Ok(())
    }

    fn destroy_synapse_unchecked(&mut self, synapse: Synapse) {
        let data = &self.synapses[synapse as usize];
        let segment = data.segment as usize;
        let was_connected = data.permanence >= self.connected_threshold;

        let segment_data = &mut self.segments[segment];
        if let Some(pos) = segment_data.synapses.iter().position(|&s| s == synapse) {
            segment_data.synapses.remove(pos);
        }
        if was_connected {
            segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
        }

        self.release_synapse(synapse);
    }

    /// Drops a synapse from the reverse index and frees its slot. The caller has
    /// already detached it from its segment.
    fn release_synapse(&mut self, synapse: Synapse) {
        let data = &mut self.synapses[synapse as usize];
        let cell = data.presynaptic_cell;
        let was_connected = data.permanence >= self.connected_threshold;
        data.destroyed = true;

        remove_from_index(&mut self.potential_synapses_for_presynaptic_cell, cell, synapse);
        if was_connected {
            remove_from_index(&mut self.connected_synapses_for_presynaptic_cell, cell, synapse);
        }

        self.destroyed_synapses.push(synapse);
    }

    /// Sets a synapse's permanence (clamped to `[0, 1]`), keeping the connected
    /// count and the reverse index in step.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if destroyed.
    pub fn update_synapse_permanence(
        &mut self,
        synapse: Synapse,
        permanence: Permanence,
    ) -> Result<()> {
        self.check_synapse(synapse)?;
        self.update_permanence_unchecked(synapse, permanence);
        Ok(())
    }

    fn update_permanence_unchecked(&mut self, synapse: Synapse, permanence: Permanence) {
        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        let threshold = self.connected_threshold;

        let data = &mut self.synapses[synapse as usize];
        let was_connected = data.permanence >= threshold;
        let is_connected = permanence >= threshold;
        data.permanence = permanence;
        let (cell, segment) = (data.presynaptic_cell, data.segment as usize);

        if was_connected == is_connected {
            return;
        }

        let segment_data = &mut self.segments[segment];
        if is_connected {
            segment_data.num_connected += 1;
            self.connected_synapses_for_presynaptic_cell
                .entry(cell)
                .or_default()
                .push(synapse);
        } else {
            segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
            remove_from_index(&mut self.connected_synapses_for_presynaptic_cell, cell, synapse);
        }
    }

    /// Gets the synapses on a segment, in creation order.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    #[inline]
    pub fn synapses_for_segment(&self, segment: Segment) -> &[Synapse] {
        &self.segments[segment as usize].synapses
    }

    /// Gets the segment that owns a synapse.
    ///
    /// # Panics
    ///
    /// Panics if `synapse` is out of range.
    #[inline]
    pub fn segment_for_synapse(&self, synapse: Synapse) -> Segment {
        self.synapses[synapse as usize].segment
    }

    /// Gets the synapse data.
    ///
    /// # Panics
    ///
    /// Panics if `synapse` is out of range.
    #[inline]
    pub fn data_for_synapse(&self, synapse: Synapse) -> &SynapseData {
        &self.synapses[synapse as usize]
    }

    /// Gets the presynaptic cell of a synapse.
    ///
    /// # Panics
    ///
    /// Panics if `synapse` is out of range.
    #[inline]
    pub fn presynaptic_cell_for_synapse(&self, synapse: Synapse) -> CellIdx {
        self.synapses[synapse as usize].presynaptic_cell
    }

    /// Gets the permanence of a synapse.
    ///
    /// # Panics
    ///
    /// Panics if `synapse` is out of range.
    #[inline]
    pub fn permanence_for_synapse(&self, synapse: Synapse) -> Permanence {
        self.synapses[synapse as usize].permanence
    }

    /// Gets the presynaptic cells for a segment, in synapse order.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    pub fn presynaptic_cells_for_segment(&self, segment: Segment) -> Vec<CellIdx> {
        self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| self.synapses[s as usize].presynaptic_cell)
            .collect()
    }

    /// Gets every synapse, on any segment, fed by `cell`.
    pub fn synapses_for_presynaptic_cell(&self, cell: CellIdx) -> &[Synapse] {
        self.potential_synapses_for_presynaptic_cell
            .get(&cell)
            .map_or(&[][..], Vec::as_slice)
    }

    // ========================================================================
    // Activity computation
    // ========================================================================

    /// Advances the iteration counter. Call once per compute cycle, before the
    /// activity computation. With time-series mode and `learn`, this also starts a
    /// new cycle of update history.
    pub fn tick(&mut self, learn: bool) {
        self.iteration = self.iteration.wrapping_add(1);

        if self.timeseries && learn {
            std::mem::swap(&mut self.previous_updates, &mut self.current_updates);
            self.current_updates.clear();
            self.current_updates.resize(self.synapses.len(), 0.0);
        }
    }

    /// Counts, for every segment, the synapses whose presynaptic cell is active.
    ///
    /// With `connected_only` only synapses at or above the connected threshold
    /// count ("active" count); otherwise synapses of any permanence count
    /// ("matching" count). `active_presynaptic_cells` must not contain duplicates.
    pub fn compute_activity(
        &self,
        active_presynaptic_cells: &[CellIdx],
        connected_only: bool,
    ) -> Vec<SynapseIdx> {
        let index = if connected_only {
            &self.connected_synapses_for_presynaptic_cell
        } else {
            &self.potential_synapses_for_presynaptic_cell
        };

        let mut counts: Vec<SynapseIdx> = vec![0; self.segments.len()];
        for cell in active_presynaptic_cells {
            for &synapse in index.get(cell).map_or(&[][..], Vec::as_slice) {
                let segment = self.synapses[synapse as usize].segment as usize;
                counts[segment] = counts[segment].saturating_add(1);
            }
        }
        counts
    }

    /// Computes both the connected and the potential counts in one pass.
    pub fn compute_segment_activity(&self, active_presynaptic_cells: &[CellIdx]) -> SegmentActivity {
        let len = self.segments.len();

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;

            if active_presynaptic_cells.len() >= PARALLEL_MIN_ACTIVE {
                return active_presynaptic_cells
                    .par_iter()
                    .fold(
                        || SegmentActivity::zeroed(len),
                        |mut activity, &cell| {
                            self.accumulate_activity(&mut activity, cell);
                            activity
                        },
                    )
                    .reduce(|| SegmentActivity::zeroed(len), SegmentActivity::merge);
            }
        }

        let mut activity = SegmentActivity::zeroed(len);
        for &cell in active_presynaptic_cells {
            self.accumulate_activity(&mut activity, cell);
        }
        activity
    }

    fn accumulate_activity(&self, activity: &mut SegmentActivity, cell: CellIdx) {
        if let Some(synapses) = self.connected_synapses_for_presynaptic_cell.get(&cell) {
            for &synapse in synapses {
                let segment = self.synapses[synapse as usize].segment as usize;
                activity.connected[segment] = activity.connected[segment].saturating_add(1);
            }
        }
        if let Some(synapses) = self.potential_synapses_for_presynaptic_cell.get(&cell) {
            for &synapse in synapses {
                let segment = self.synapses[synapse as usize].segment as usize;
                activity.potential[segment] = activity.potential[segment].saturating_add(1);
            }
        }
    }

    // ========================================================================
    // Learning operations
    // ========================================================================

    /// Hebbian update of one segment.
    ///
    /// Synapses whose presynaptic cell is active in `inputs` move by `increment`,
    /// all others by `-decrement`, saturating at 0 and 1. A negative `increment`
    /// punishes active synapses instead.
    ///
    /// With `prune_zero_synapses`, synapses that reach zero permanence are
    /// destroyed, and if fewer than `segment_threshold` synapses remain the whole
    /// segment is destroyed.
    ///
    /// Returns `Ok(false)` if the segment was destroyed, `Ok(true)` otherwise.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if destroyed.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        inputs: &Sdr,
        increment: Permanence,
        decrement: Permanence,
        prune_zero_synapses: bool,
        segment_threshold: u32,
    ) -> Result<bool> {
        self.check_segment(segment)?;
        self.segments[segment as usize].last_used = self.iteration;

        let synapses = self.segments[segment as usize].synapses.clone();
        let mut to_prune: SmallVec<[Synapse; 16]> = SmallVec::new();

        for synapse in synapses {
            let data = &self.synapses[synapse as usize];
            let old_perm = data.permanence;

            let update = if inputs.contains(data.presynaptic_cell) {
                increment
            } else {
                -decrement
            };
            let delta = self.timeseries_delta(synapse, update);

            let new_perm = (old_perm + delta).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
            if new_perm != old_perm {
                self.update_permanence_unchecked(synapse, new_perm);
            }

            if prune_zero_synapses && new_perm < MIN_PERMANENCE + EPSILON {
                to_prune.push(synapse);
            }
        }

        self.pruned_synapses += to_prune.len();
        for synapse in to_prune {
            self.destroy_synapse_unchecked(synapse);
        }

        let remaining = self.segments[segment as usize].synapses.len();
        if prune_zero_synapses && remaining < segment_threshold as usize {
            log::trace!(
                "segment {segment} left with {remaining} synapses (< {segment_threshold}), destroying"
            );
            self.destroy_segment_unchecked(segment);
            self.pruned_segments += 1;
            return Ok(false);
        }

        Ok(true)
    }

    /// In time-series mode, skips an update identical to the one this synapse
    /// received on the previous cycle. Any other update applies in full.
    #[allow(clippy::float_cmp)]
    fn timeseries_delta(&mut self, synapse: Synapse, update: Permanence) -> Permanence {
        if !self.timeseries {
            return update;
        }

        let idx = synapse as usize;
        if self.current_updates.len() <= idx {
            self.current_updates.resize(self.synapses.len(), 0.0);
        }
        self.current_updates[idx] = update;

        match self.previous_updates.get(idx) {
            Some(&previous) if previous != 0.0 && previous == update => 0.0,
            _ => update,
        }
    }

    /// Grows synapses from `segment` to growth candidates it is not yet connected to.
    ///
    /// Up to `max_new` candidates (all of them when `None`) are chosen at random.
    /// `max_synapses_per_segment` bounds the segment; `None` and larger values
    /// mean `SynapseIdx::MAX`. If the bound would be exceeded, the weakest
    /// existing synapses (never those to a candidate) are destroyed first; growth
    /// shrinks if not enough room can be made. Returns the number of synapses created.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range segment or candidate cell, `NotFound`
    /// if the segment was destroyed.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        growth_candidates: &[CellIdx],
        initial_permanence: Permanence,
        rng: &mut Random,
        max_new: Option<usize>,
        max_synapses_per_segment: Option<usize>,
    ) -> Result<usize> {
        self.check_segment(segment)?;

        let mut candidates = growth_candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();
        if let Some(&highest) = candidates.last() {
            self.check_cell(highest, "growth_candidates")?;
        }

        for &synapse in &self.segments[segment as usize].synapses {
            let cell = self.synapses[synapse as usize].presynaptic_cell;
            if let Ok(pos) = candidates.binary_search(&cell) {
                candidates.remove(pos);
            }
        }

        let mut num_new = max_new.map_or(candidates.len(), |m| m.min(candidates.len()));

        let max_synapses = max_synapses_per_segment
            .map_or(MAX_SYNAPSES_PER_SEGMENT, |m| m.min(MAX_SYNAPSES_PER_SEGMENT));
        let current = self.segments[segment as usize].synapses.len();
        let overrun = (current + num_new).saturating_sub(max_synapses);
        if overrun > 0 {
            log::trace!("segment {segment} full, destroying {overrun} weakest synapses");
            self.destroy_min_permanence_synapses_unchecked(segment, overrun, growth_candidates);
        }
        let room = max_synapses.saturating_sub(self.segments[segment as usize].synapses.len());
        num_new = num_new.min(room);

        if num_new == 0 {
            return Ok(0);
        }

        for cell in rng.sample(candidates, num_new) {
            self.create_synapse_unchecked(segment, cell, initial_permanence);
        }
        Ok(num_new)
    }

    /// Destroys the `n_destroy` weakest synapses on a segment, skipping synapses
    /// whose presynaptic cell is listed in `exclude_cells`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if destroyed.
    pub fn destroy_min_permanence_synapses(
        &mut self,
        segment: Segment,
        n_destroy: usize,
        exclude_cells: &[CellIdx],
    ) -> Result<()> {
        self.check_segment(segment)?;
        self.destroy_min_permanence_synapses_unchecked(segment, n_destroy, exclude_cells);
        Ok(())
    }

    fn destroy_min_permanence_synapses_unchecked(
        &mut self,
        segment: Segment,
        n_destroy: usize,
        exclude_cells: &[CellIdx],
    ) {
        if n_destroy == 0 {
            return;
        }

        let mut excluded = exclude_cells.to_vec();
        excluded.sort_unstable();

        let mut candidates: Vec<(Permanence, CellIdx, Synapse)> = self.segments
            [segment as usize]
            .synapses
            .iter()
            .map(|&s| {
                let data = &self.synapses[s as usize];
                (data.permanence, data.presynaptic_cell, s)
            })
            .filter(|(_, cell, _)| excluded.binary_search(cell).is_err())
            .collect();

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, _, synapse) in candidates.into_iter().take(n_destroy) {
            self.destroy_synapse_unchecked(synapse);
        }
    }

    /// Uniformly raises the permanences on a segment until at least
    /// `segment_threshold` synapses (or all of them, if fewer) are connected.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if destroyed.
    pub fn raise_permanences_to_threshold(
        &mut self,
        segment: Segment,
        segment_threshold: u32,
    ) -> Result<()> {
        self.check_segment(segment)?;

        let data = &self.segments[segment as usize];
        let wanted = (segment_threshold as usize).min(data.synapses.len());
        if wanted == 0 || data.num_connected as usize >= wanted {
            return Ok(());
        }

        let mut permanences = self.sorted_permanences_desc(segment);
        permanences.truncate(wanted);
        if let Some(&weakest_wanted) = permanences.last() {
            let delta = self.connected_threshold - weakest_wanted;
            self.bump_segment_unchecked(segment, delta + EPSILON);
        }
        Ok(())
    }

    /// Adds `delta` to every permanence on a segment.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range handle, `NotFound` if destroyed.
    pub fn bump_segment(&mut self, segment: Segment, delta: Permanence) -> Result<()> {
        self.check_segment(segment)?;
        self.bump_segment_unchecked(segment, delta);
        Ok(())
    }

    fn bump_segment_unchecked(&mut self, segment: Segment, delta: Permanence) {
        let synapses = self.segments[segment as usize].synapses.clone();
        for synapse in synapses {
            let old_perm = self.synapses[synapse as usize].permanence;
            self.update_permanence_unchecked(synapse, old_perm + delta);
        }
    }

    /// Keeps the number of connected synapses on a segment within
    /// `[minimum_synapses, maximum_synapses]` by shifting all of its permanences
    /// by the same amount.
    ///
    /// Synapses with equal permanence always move together. When the synapse at
    /// the bound ties with others, all of them cross the threshold, so fewer than
    /// `maximum_synapses` (or more than `minimum_synapses`) may end up connected.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `minimum_synapses > maximum_synapses` or for an
    /// out-of-range handle, `NotFound` if destroyed.
    pub fn synapse_competition(
        &mut self,
        segment: Segment,
        minimum_synapses: SynapseIdx,
        maximum_synapses: SynapseIdx,
    ) -> Result<()> {
        self.check_segment(segment)?;
        if minimum_synapses > maximum_synapses {
            return Err(DendriteError::InvalidArgument {
                name: "minimum_synapses",
                message: format!("{minimum_synapses} > maximum_synapses {maximum_synapses}"),
            });
        }

        let data = &self.segments[segment as usize];
        let num_synapses = data.synapses.len();
        let connected = data.num_connected as usize;
        let minimum = (minimum_synapses as usize).min(num_synapses);
        let maximum = maximum_synapses as usize;

        let permanences = self.sorted_permanences_desc(segment);
        let delta = if connected < minimum {
            // the minimum-th strongest synapse must reach the threshold
            self.connected_threshold - permanences[minimum - 1] + EPSILON
        } else if connected > maximum {
            // the (maximum + 1)-th strongest synapse must drop below it
            self.connected_threshold - permanences[maximum] - EPSILON
        } else {
            return Ok(());
        };

        self.bump_segment_unchecked(segment, delta);
        Ok(())
    }

    fn sorted_permanences_desc(&self, segment: Segment) -> Vec<Permanence> {
        let mut permanences: Vec<Permanence> = self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| self.synapses[s as usize].permanence)
            .collect();
        permanences.sort_by(|a, b| b.total_cmp(a));
        permanences
    }

    /// Clears time-series update history (sequence boundary).
    pub fn reset(&mut self) {
        self.previous_updates.clear();
        self.current_updates.clear();
    }
}

fn remove_from_index(index: &mut AHashMap<CellIdx, Vec<Synapse>>, cell: CellIdx, synapse: Synapse) {
    if let Some(synapses) = index.get_mut(&cell) {
        if let Some(pos) = synapses.iter().position(|&s| s == synapse) {
            synapses.swap_remove(pos);
        }
        if synapses.is_empty() {
            index.remove(&cell);
        }
    }
}

impl PartialEq for Connections {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
            && self.segments == other.segments
            && self.synapses == other.synapses
            && self.segment_eviction == other.segment_eviction
            && self.timeseries == other.timeseries
            && (self.connected_threshold - other.connected_threshold).abs() < EPSILON
    }
}

impl fmt::Display for Connections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num_segments = self.num_segments();
        let num_connected: usize = self
            .segments
            .iter()
            .filter(|s| !s.destroyed)
            .map(|s| s.num_connected as usize)
            .sum();
        let mean_synapses = if num_segments == 0 {
            0.0
        } else {
            self.num_synapses() as f64 / num_segments as f64
        };

        writeln!(f, "Connections:")?;
        writeln!(f, "    Cells               {}", self.num_cells())?;
        writeln!(f, "    Segments            {num_segments}")?;
        writeln!(f, "    Synapses            {}", self.num_synapses())?;
        writeln!(f, "    Connected synapses  {num_connected}")?;
        writeln!(f, "    Synapses / segment  {mean_synapses:.2}")?;
        write!(f, "    Iteration           {}", self.iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUM_CELLS: CellIdx = 4096;

    fn connections(threshold: Permanence) -> Connections {
        Connections::new(ConnectionsParams {
            num_cells: 100,
            connected_threshold: threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_create_connections() {
        let conn = Connections::with_cells(100);
        assert_eq!(conn.num_cells(), 100);
        assert_eq!(conn.num_segments(), 0);
        assert_eq!(conn.num_synapses(), 0);
        assert_eq!(conn.segment_eviction(), SegmentEviction::Oldest);
    }

    #[test]
    fn test_create_segment() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 255).unwrap();

        assert_eq!(conn.num_segments(), 1);
        assert_eq!(conn.cell_for_segment(seg), 10);
        assert_eq!(conn.segments_for_cell(10), &[seg]);
        assert_eq!(conn.num_synapses_on_segment(seg), 0);
        assert_eq!(conn.idx_on_cell_for_segment(seg), Some(0));
    }

    #[test]
    fn test_create_segment_invalid_arguments() {
        let mut conn = Connections::with_cells(100);
        assert!(matches!(
            conn.create_segment(100, 1),
            Err(DendriteError::InvalidArgument { name: "cell", .. })
        ));
        assert!(matches!(
            conn.create_segment(5, 0),
            Err(DendriteError::InvalidArgument {
                name: "max_segments_per_cell",
                ..
            })
        ));
        assert_eq!(conn.num_segments(), 0);
    }

    #[test]
    fn test_create_synapse_keeps_max_permanence() {
        let mut conn = Connections::new(ConnectionsParams {
            num_cells: NUM_CELLS,
            connected_threshold: 0.51,
            ..Default::default()
        });

        let seg = conn.create_segment(NUM_CELLS - 1, 1).unwrap();
        let syn1 = conn.create_synapse(seg, NUM_CELLS - 1, 0.52).unwrap();
        assert_eq!(conn.permanence_for_synapse(syn1), 0.52);
        assert_eq!(conn.num_synapses(), 1);

        let syn2 = conn.create_synapse(seg, NUM_CELLS - 1, 0.11).unwrap();
        assert_eq!(syn1, syn2);
        assert_eq!(conn.permanence_for_synapse(syn1), 0.52);

        let syn3 = conn.create_synapse(seg, NUM_CELLS - 1, 0.99).unwrap();
        assert_eq!(syn1, syn3);
        assert_eq!(conn.permanence_for_synapse(syn1), 0.99);

        let other = conn.create_synapse(seg, 1, 0.52).unwrap();
        assert_ne!(syn1, other);
        assert_eq!(conn.num_synapses(), 2);
        assert_eq!(conn.num_synapses_on_segment(seg), 2);
    }

    #[test]
    fn test_create_synapse_invalid_arguments() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();

        assert!(matches!(
            conn.create_synapse(seg, 100, 0.5),
            Err(DendriteError::InvalidArgument {
                name: "presynaptic_cell",
                ..
            })
        ));
        assert!(matches!(
            conn.create_synapse(seg + 1, 1, 0.5),
            Err(DendriteError::InvalidArgument { name: "segment", .. })
        ));
        assert!(conn.create_synapse(seg, 1, f32::NAN).is_err());

        conn.destroy_segment(seg).unwrap();
        assert_eq!(
            conn.create_synapse(seg, 1, 0.5),
            Err(DendriteError::NotFound {
                entity: "segment",
                index: seg
            })
        );
    }

    #[test]
    fn test_create_synapse_clamps_permanence() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();
        let high = conn.create_synapse(seg, 1, 1.7).unwrap();
        let low = conn.create_synapse(seg, 2, -0.3).unwrap();
        assert_eq!(conn.permanence_for_synapse(high), MAX_PERMANENCE);
        assert_eq!(conn.permanence_for_synapse(low), MIN_PERMANENCE);
    }

    #[test]
    fn test_connected_count() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 50, 0.6).unwrap();
        conn.create_synapse(seg, 51, 0.4).unwrap();
        conn.create_synapse(seg, 52, 0.5).unwrap(); // at threshold counts as connected

        assert_eq!(conn.num_connected_synapses(seg), 2);
    }

    #[test]
    fn test_update_permanence_moves_between_indices() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        let syn = conn.create_synapse(seg, 50, 0.4).unwrap();

        assert_eq!(conn.compute_activity(&[50], true)[seg as usize], 0);
        assert_eq!(conn.compute_activity(&[50], false)[seg as usize], 1);

        conn.update_synapse_permanence(syn, 0.6).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 1);
        assert_eq!(conn.compute_activity(&[50], true)[seg as usize], 1);

        conn.update_synapse_permanence(syn, 0.3).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 0);
        assert_eq!(conn.compute_activity(&[50], true)[seg as usize], 0);
    }

    #[test]
    fn test_destroy_synapse() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();
        let syn = conn.create_synapse(seg, 50, 0.5).unwrap();

        conn.destroy_synapse(syn).unwrap();
        assert_eq!(conn.num_synapses(), 0);
        assert_eq!(conn.num_synapses_on_segment(seg), 0);
        assert_eq!(conn.num_connected_synapses(seg), 0);
        assert!(conn.synapses_for_presynaptic_cell(50).is_empty());
        assert!(!conn.synapse_exists(syn));

        assert_eq!(
            conn.destroy_synapse(syn),
            Err(DendriteError::NotFound {
                entity: "synapse",
                index: syn
            })
        );
        assert!(matches!(
            conn.destroy_synapse(99),
            Err(DendriteError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_destroy_segment_cascades() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 50, 0.5).unwrap();
        conn.create_synapse(seg, 51, 0.7).unwrap();
        let keep = conn.create_segment(11, 1).unwrap();
        conn.create_synapse(keep, 50, 0.7).unwrap();

        conn.destroy_segment(seg).unwrap();
        assert_eq!(conn.num_segments(), 1);
        assert_eq!(conn.num_synapses(), 1);
        assert!(conn.segments_for_cell(10).is_empty());
        assert!(conn.synapses_for_presynaptic_cell(51).is_empty());
        assert_eq!(conn.synapses_for_presynaptic_cell(50).len(), 1);

        let activity = conn.compute_segment_activity(&[50, 51]);
        assert_eq!(activity.potential[keep as usize], 1);
        assert_eq!(activity.potential[seg as usize], 0);

        assert!(conn.destroy_segment(seg).is_err());
    }

    #[test]
    fn test_slot_reuse_does_not_disturb_other_handles() {
        let mut conn = Connections::with_cells(100);
        let a = conn.create_segment(1, 8).unwrap();
        let b = conn.create_segment(2, 8).unwrap();
        let syn_b = conn.create_synapse(b, 7, 0.3).unwrap();

        conn.destroy_segment(a).unwrap();
        let c = conn.create_segment(3, 8).unwrap();

        assert_eq!(c, a); // freed slot reused
        assert_eq!(conn.cell_for_segment(c), 3);
        assert_eq!(conn.cell_for_segment(b), 2);
        assert_eq!(conn.segment_for_synapse(syn_b), b);
        assert_eq!(conn.segment_flat_list_length(), 2);
    }

    #[test]
    fn test_eviction_oldest() {
        let mut conn = Connections::with_cells(100);
        let s1 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s1, 50, 0.5).unwrap();
        let s2 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s2, 51, 0.5).unwrap();
        conn.create_synapse(s2, 52, 0.5).unwrap();

        let s3 = conn.create_segment(10, 2).unwrap();

        let segments = conn.segments_for_cell(10);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], s2);
        assert_eq!(segments[1], s3);
        assert_eq!(conn.num_synapses(), 2);
        assert!(conn.synapses_for_presynaptic_cell(50).is_empty());
        assert_eq!(conn.pruned_segments(), 1);
    }

    #[test]
    fn test_eviction_least_recently_used() {
        let mut conn = Connections::new(ConnectionsParams {
            num_cells: 100,
            segment_eviction: SegmentEviction::LeastRecentlyUsed,
            ..Default::default()
        });
        let s1 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s1, 50, 0.5).unwrap();
        let s2 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s2, 51, 0.5).unwrap();

        conn.tick(true);
        let input = Sdr::from_sparse(&[100], &[50]).unwrap();
        conn.adapt_segment(s1, &input, 0.1, 0.1, false, 0).unwrap();

        conn.create_segment(10, 2).unwrap();
        assert!(conn.segments_for_cell(10).contains(&s1));
        assert!(conn.synapses_for_presynaptic_cell(51).is_empty());
    }

    #[test]
    fn test_eviction_fewest_synapses() {
        let mut conn = Connections::new(ConnectionsParams {
            num_cells: 100,
            segment_eviction: SegmentEviction::FewestSynapses,
            ..Default::default()
        });
        let s1 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s1, 50, 0.5).unwrap();
        conn.create_synapse(s1, 51, 0.5).unwrap();
        let s2 = conn.create_segment(10, 2).unwrap();
        conn.create_synapse(s2, 52, 0.5).unwrap();

        conn.create_segment(10, 2).unwrap();
        assert!(conn.segments_for_cell(10).contains(&s1));
        assert_eq!(conn.num_synapses(), 2);
    }

    #[test]
    fn test_compute_activity() {
        let mut conn = connections(0.5);

        let seg1 = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg1, 50, 0.6).unwrap();
        conn.create_synapse(seg1, 51, 0.6).unwrap();
        conn.create_synapse(seg1, 52, 0.4).unwrap();

        let seg2 = conn.create_segment(20, 1).unwrap();
        conn.create_synapse(seg2, 50, 0.6).unwrap();

        let active = [50, 51, 52, 53];
        let connected = conn.compute_activity(&active, true);
        assert_eq!(connected[seg1 as usize], 2);
        assert_eq!(connected[seg2 as usize], 1);

        let activity = conn.compute_segment_activity(&active);
        assert_eq!(activity.connected, connected);
        assert_eq!(activity.potential[seg1 as usize], 3);
        assert_eq!(activity.potential, conn.compute_activity(&active, false));
    }

    #[test]
    fn test_adapt_segment_hebbian() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        let syn1 = conn.create_synapse(seg, 50, 0.5).unwrap();
        let syn2 = conn.create_synapse(seg, 51, 0.5).unwrap();

        let input = Sdr::from_sparse(&[100], &[50]).unwrap();
        assert!(conn.adapt_segment(seg, &input, 0.1, 0.1, false, 0).unwrap());

        assert!((conn.permanence_for_synapse(syn1) - 0.6).abs() < 1e-6);
        assert!((conn.permanence_for_synapse(syn2) - 0.4).abs() < 1e-6);
        assert_eq!(conn.num_connected_synapses(seg), 1);
    }

    #[test]
    fn test_adapt_segment_ten_synapses() {
        let mut conn = Connections::new(ConnectionsParams {
            num_cells: NUM_CELLS,
            connected_threshold: 0.51,
            ..Default::default()
        });
        let seg = conn.create_segment(200, 1).unwrap();
        let inputs: Vec<CellIdx> = (0..10).collect();
        for &cell in &inputs {
            conn.create_synapse(seg, cell, 0.1).unwrap();
        }

        let sdr = Sdr::from_sparse(&[1024], &inputs).unwrap();
        conn.adapt_segment(seg, &sdr, 0.1, 0.0, false, 0).unwrap();

        for &syn in conn.synapses_for_segment(seg) {
            assert!((conn.permanence_for_synapse(syn) - 0.2).abs() < 1e-6);
        }
        assert_eq!(conn.compute_activity(&inputs, false)[seg as usize], 10);
        assert_eq!(conn.compute_activity(&inputs, true)[seg as usize], 0);
    }

    #[test]
    fn test_adapt_saturates() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        let up = conn.create_synapse(seg, 1, 0.95).unwrap();
        let down = conn.create_synapse(seg, 2, 0.05).unwrap();

        let input = Sdr::from_sparse(&[100], &[1]).unwrap();
        conn.adapt_segment(seg, &input, 0.2, 0.2, false, 0).unwrap();

        assert_eq!(conn.permanence_for_synapse(up), MAX_PERMANENCE);
        assert_eq!(conn.permanence_for_synapse(down), MIN_PERMANENCE);
        assert_eq!(conn.num_synapses(), 2); // no pruning requested
    }

    #[test]
    fn test_adapt_prunes_synapses_then_segment() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 1, 0.3).unwrap();
        conn.create_synapse(seg, 2, 0.1).unwrap();
        let empty = Sdr::new(&[100]);

        assert!(conn.adapt_segment(seg, &empty, 0.1, 0.1, true, 1).unwrap());
        assert_eq!(conn.num_synapses_on_segment(seg), 1);
        assert_eq!(conn.pruned_synapses(), 1);

        assert!(conn.adapt_segment(seg, &empty, 0.1, 0.1, true, 1).unwrap());
        assert!(!conn.adapt_segment(seg, &empty, 0.1, 0.1, true, 1).unwrap());
        assert!(!conn.segment_exists(seg));
        assert!(conn.segments_for_cell(10).is_empty());
        assert_eq!(conn.num_synapses(), 0);
    }

    #[test]
    fn test_adapt_empty_segment_threshold() {
        let mut conn = connections(0.5);
        let a = conn.create_segment(10, 2).unwrap();
        let b = conn.create_segment(10, 2).unwrap();
        let input = Sdr::from_sparse(&[100], &[1, 2, 3]).unwrap();

        // without pruning an empty segment survives
        assert!(conn.adapt_segment(a, &input, 0.1, 0.001, false, 1).unwrap());
        assert_eq!(conn.segments_for_cell(10).len(), 2);

        assert!(!conn.adapt_segment(a, &input, 0.1, 0.001, true, 1).unwrap());
        assert_eq!(conn.segments_for_cell(10), &[b]);
    }

    #[test]
    fn test_adapt_negative_increment_punishes() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        let active = conn.create_synapse(seg, 1, 0.5).unwrap();
        let inactive = conn.create_synapse(seg, 2, 0.5).unwrap();

        let input = Sdr::from_sparse(&[100], &[1]).unwrap();
        conn.adapt_segment(seg, &input, -0.1, 0.0, true, 0).unwrap();

        assert!((conn.permanence_for_synapse(active) - 0.4).abs() < 1e-6);
        assert_eq!(conn.permanence_for_synapse(inactive), 0.5);
    }

    #[test]
    fn test_grow_synapses() {
        let mut conn = Connections::with_cells(100);
        let mut rng = Random::new(42);

        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 50, 0.5).unwrap();

        let grown = conn
            .grow_synapses(seg, &[50, 51, 52, 53], 0.21, &mut rng, Some(2), None)
            .unwrap();

        assert_eq!(grown, 2);
        assert_eq!(conn.num_synapses_on_segment(seg), 3);
        let cells = conn.presynaptic_cells_for_segment(seg);
        assert_eq!(cells.iter().filter(|&&c| c == 50).count(), 1);
    }

    #[test]
    fn test_grow_synapses_respects_cap() {
        let mut conn = Connections::with_cells(100);
        let mut rng = Random::new(42);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 1, 0.9).unwrap();
        conn.create_synapse(seg, 2, 0.2).unwrap();
        conn.create_synapse(seg, 3, 0.6).unwrap();

        let grown = conn
            .grow_synapses(seg, &[20, 21], 0.3, &mut rng, None, Some(4))
            .unwrap();

        assert_eq!(grown, 2);
        assert_eq!(conn.num_synapses_on_segment(seg), 4);
        let cells = conn.presynaptic_cells_for_segment(seg);
        assert!(!cells.contains(&2)); // weakest synapse made room
        assert!(cells.contains(&20) && cells.contains(&21));

        assert!(conn
            .grow_synapses(seg, &[100], 0.3, &mut rng, None, None)
            .is_err());
    }

    #[test]
    fn test_destroy_min_permanence_synapses() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 1, 0.1).unwrap();
        conn.create_synapse(seg, 2, 0.2).unwrap();
        conn.create_synapse(seg, 3, 0.3).unwrap();

        conn.destroy_min_permanence_synapses(seg, 2, &[1]).unwrap();
        assert_eq!(conn.presynaptic_cells_for_segment(seg), vec![1]);
    }

    #[test]
    fn test_raise_permanences_to_threshold() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 50, 0.4).unwrap();
        conn.create_synapse(seg, 51, 0.3).unwrap();
        conn.create_synapse(seg, 52, 0.2).unwrap();

        conn.raise_permanences_to_threshold(seg, 2).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 2);

        // asking for more synapses than exist connects them all
        conn.raise_permanences_to_threshold(seg, 10).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 3);
    }

    #[test]
    fn test_bump_segment() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 50, 0.5).unwrap();
        conn.create_synapse(seg, 51, 0.95).unwrap();

        conn.bump_segment(seg, 0.1).unwrap();

        let perms: Vec<Permanence> = conn
            .synapses_for_segment(seg)
            .iter()
            .map(|&s| conn.permanence_for_synapse(s))
            .collect();
        assert!((perms[0] - 0.6).abs() < 1e-6);
        assert_eq!(perms[1], MAX_PERMANENCE);
    }

    #[test]
    fn test_synapse_competition() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        for (cell, perm) in [(1, 0.9), (2, 0.8), (3, 0.7), (4, 0.6), (5, 0.2)] {
            conn.create_synapse(seg, cell, perm).unwrap();
        }
        assert_eq!(conn.num_connected_synapses(seg), 4);

        conn.synapse_competition(seg, 1, 2).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 2);

        conn.synapse_competition(seg, 5, 5).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 5);

        assert!(conn.synapse_competition(seg, 3, 2).is_err());
    }

    #[test]
    fn test_synapse_competition_moves_ties_together() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        for (cell, perm) in [(1, 0.9), (2, 0.7), (3, 0.7), (4, 0.7)] {
            conn.create_synapse(seg, cell, perm).unwrap();
        }

        // the third strongest ties with the second, so both drop out
        conn.synapse_competition(seg, 0, 2).unwrap();
        assert_eq!(conn.num_connected_synapses(seg), 1);
    }

    #[test]
    fn test_create_synapse_rejects_full_segment() {
        let max = SynapseIdx::MAX as CellIdx;
        let mut conn = Connections::with_cells(max + 10);
        let seg = conn.create_segment(0, 1).unwrap();
        for cell in 0..max {
            conn.create_synapse(seg, cell, 0.9).unwrap();
        }
        assert_eq!(conn.num_synapses_on_segment(seg), SynapseIdx::MAX as usize);
        assert_eq!(conn.num_connected_synapses(seg), SynapseIdx::MAX as usize);

        assert!(matches!(
            conn.create_synapse(seg, max, 0.9),
            Err(DendriteError::InvalidArgument { name: "segment", .. })
        ));
        // an existing synapse can still be updated
        let first = conn.create_synapse(seg, 0, 1.0).unwrap();
        assert_eq!(conn.permanence_for_synapse(first), 1.0);

        let all: Vec<CellIdx> = (0..max).collect();
        assert_eq!(conn.compute_activity(&all, true)[seg as usize], SynapseIdx::MAX);

        // unbounded growth makes room below the same cap
        let mut rng = Random::new(3);
        let grown = conn
            .grow_synapses(seg, &[max, max + 1], 0.9, &mut rng, None, None)
            .unwrap();
        assert_eq!(grown, 2);
        assert_eq!(conn.num_synapses_on_segment(seg), SynapseIdx::MAX as usize);
        let cells = conn.presynaptic_cells_for_segment(seg);
        assert!(cells.contains(&max) && cells.contains(&(max + 1)));
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_activity_matches_sequential() {
        let num_cells = 4096;
        let mut conn = Connections::with_cells(num_cells);
        let mut rng = Random::new(11);
        for cell in (0..num_cells).step_by(4) {
            let seg = conn.create_segment(cell, 2).unwrap();
            for _ in 0..24 {
                let presynaptic = rng.get_usize(num_cells as usize) as CellIdx;
                conn.create_synapse(seg, presynaptic, rng.get_real64() as Permanence)
                    .unwrap();
            }
        }

        let active: Vec<CellIdx> = (0..num_cells).step_by(3).collect();
        assert!(active.len() >= PARALLEL_MIN_ACTIVE);

        let activity = conn.compute_segment_activity(&active);
        assert_eq!(activity.connected, conn.compute_activity(&active, true));
        assert_eq!(activity.potential, conn.compute_activity(&active, false));
        assert!(activity.potential.iter().any(|&n| n > 0));
    }

    #[test]
    fn test_timeseries_skips_repeated_updates() {
        let mut conn = Connections::new(ConnectionsParams {
            num_cells: 100,
            connected_threshold: 0.5,
            timeseries: true,
            ..Default::default()
        });
        let seg = conn.create_segment(10, 1).unwrap();
        let syn = conn.create_synapse(seg, 1, 0.3).unwrap();
        let input = Sdr::from_sparse(&[100], &[1]).unwrap();

        conn.tick(true);
        conn.adapt_segment(seg, &input, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.4).abs() < 1e-6);

        // same input on the next cycle: no further change
        conn.tick(true);
        conn.adapt_segment(seg, &input, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.4).abs() < 1e-6);

        // after a reset the history is gone
        conn.reset();
        conn.tick(true);
        conn.adapt_segment(seg, &input, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.5).abs() < 1e-6);
    }

    fn timeseries_connections() -> Connections {
        Connections::new(ConnectionsParams {
            num_cells: 100,
            connected_threshold: 0.5,
            timeseries: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_timeseries_applies_direction_change_once() {
        let mut conn = timeseries_connections();
        let seg = conn.create_segment(10, 1).unwrap();
        let syn = conn.create_synapse(seg, 1, 0.5).unwrap();
        let active = Sdr::from_sparse(&[100], &[1]).unwrap();
        let inactive = Sdr::new(&[100]);

        conn.tick(true);
        conn.adapt_segment(seg, &active, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.6).abs() < 1e-6);

        conn.tick(true);
        conn.adapt_segment(seg, &inactive, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_timeseries_inactive_synapse_never_strengthens() {
        let mut conn = timeseries_connections();
        let seg = conn.create_segment(10, 1).unwrap();
        let syn = conn.create_synapse(seg, 1, 0.5).unwrap();
        let active = Sdr::from_sparse(&[100], &[1]).unwrap();
        let inactive = Sdr::new(&[100]);

        conn.tick(true);
        conn.adapt_segment(seg, &active, -0.2, 0.0, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.3).abs() < 1e-6);

        conn.tick(true);
        conn.adapt_segment(seg, &inactive, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.2).abs() < 1e-6);

        // the same decay again on the next cycle is skipped
        conn.tick(true);
        conn.adapt_segment(seg, &inactive, 0.1, 0.1, false, 0).unwrap();
        assert!((conn.permanence_for_synapse(syn) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_compare_segments() {
        let mut conn = Connections::with_cells(100);
        let a = conn.create_segment(20, 8).unwrap();
        let b = conn.create_segment(10, 8).unwrap();
        let c = conn.create_segment(10, 8).unwrap();

        let mut segments = vec![a, c, b];
        segments.sort_by(|&x, &y| conn.compare_segments(x, y));
        assert_eq!(segments, vec![b, c, a]);
    }

    #[test]
    fn test_display_summary() {
        let mut conn = connections(0.5);
        let seg = conn.create_segment(10, 1).unwrap();
        conn.create_synapse(seg, 1, 0.6).unwrap();
        let text = conn.to_string();
        assert!(text.contains("Segments            1"));
        assert!(text.contains("Connected synapses  1"));
    }
}
