//! Temporal Memory implementation.
//!
//! The Temporal Memory learns sequences of column activations. Each step runs in
//! two phases over one [`Connections`] graph:
//!
//! 1. [`activate_dendrites`](TemporalMemory::activate_dendrites) computes segment
//!    activity from the previous step's active cells and marks cells with an
//!    active segment as predictive.
//! 2. [`activate_cells`](TemporalMemory::activate_cells) activates the predicted
//!    cells of each active column, bursts unpredicted columns, and learns.
//!
//! [`compute`](TemporalMemory::compute) runs both phases and scores the step's
//! anomaly in between.

use crate::algorithms::anomaly::raw_anomaly_score;
use crate::algorithms::{Connections, ConnectionsParams};
use crate::error::{DendriteError, Result};
use crate::types::{
    CellIdx, Permanence, Real, Sdr, Segment, SegmentIdx, SynapseIdx, UInt, MAX_PERMANENCE,
    MIN_PERMANENCE,
};
use crate::utils::Random;

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating a Temporal Memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemoryParams {
    /// Dimensions of the column space.
    pub column_dimensions: Vec<UInt>,

    /// Number of cells per column.
    pub cells_per_column: UInt,

    /// Active connected synapses needed for a segment to become active.
    pub activation_threshold: UInt,

    /// Initial permanence for new synapses.
    pub initial_permanence: Permanence,

    /// Permanence threshold for connected synapses.
    pub connected_permanence: Permanence,

    /// Active potential synapses needed for a segment to be matching.
    pub min_threshold: UInt,

    /// Maximum number of new synapses added per learning cycle.
    pub max_new_synapse_count: UInt,

    /// Amount to increment permanence for active synapses.
    pub permanence_increment: Permanence,

    /// Amount to decrement permanence for inactive synapses.
    pub permanence_decrement: Permanence,

    /// Amount to decrement permanence of segments that predicted an inactive column.
    pub predicted_segment_decrement: Permanence,

    /// Maximum number of segments per cell.
    pub max_segments_per_cell: UInt,

    /// Maximum number of synapses per segment.
    pub max_synapses_per_segment: UInt,

    /// Random seed.
    pub seed: u64,

    /// Number of external presynaptic inputs appended after the TM's own cells.
    pub external_predictive_inputs: UInt,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            column_dimensions: vec![2048],
            cells_per_column: 32,
            activation_threshold: 13,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            min_threshold: 10,
            max_new_synapse_count: 20,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
            seed: 42,
            external_predictive_inputs: 0,
        }
    }
}

impl TemporalMemoryParams {
    /// Checks the parameters for consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &'static str, message: impl Into<String>) -> Result<()> {
            Err(DendriteError::InvalidArgument {
                name,
                message: message.into(),
            })
        }

        if self.column_dimensions.is_empty() {
            return invalid("column_dimensions", "Cannot be empty");
        }
        if self.column_dimensions.contains(&0) {
            return invalid(
                "column_dimensions",
                format!("Zero dimension in {:?}", self.column_dimensions),
            );
        }
        if self.cells_per_column == 0 {
            return invalid("cells_per_column", "Must be > 0");
        }
        if self.activation_threshold == 0 {
            return invalid("activation_threshold", "Must be > 0");
        }
        if self.min_threshold == 0 {
            return invalid("min_threshold", "Must be > 0");
        }
        if self.min_threshold > self.activation_threshold {
            return invalid(
                "min_threshold",
                format!(
                    "{} exceeds activation_threshold {}",
                    self.min_threshold, self.activation_threshold
                ),
            );
        }

        for (name, value) in [
            ("initial_permanence", self.initial_permanence),
            ("connected_permanence", self.connected_permanence),
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
            ("predicted_segment_decrement", self.predicted_segment_decrement),
        ] {
            if !(MIN_PERMANENCE..=MAX_PERMANENCE).contains(&value) {
                return invalid(name, format!("{value} not in [0, 1]"));
            }
        }

        if self.max_segments_per_cell == 0
            || self.max_segments_per_cell > UInt::from(SegmentIdx::MAX)
        {
            return invalid(
                "max_segments_per_cell",
                format!("Must be in 1..={}", SegmentIdx::MAX),
            );
        }
        if self.max_synapses_per_segment == 0
            || self.max_synapses_per_segment > UInt::from(SynapseIdx::MAX)
        {
            return invalid(
                "max_synapses_per_segment",
                format!("Must be in 1..={}", SynapseIdx::MAX),
            );
        }

        let num_cells = self
            .column_dimensions
            .iter()
            .try_fold(u64::from(self.cells_per_column), |acc, &d| {
                acc.checked_mul(u64::from(d))
            })
            .and_then(|n| n.checked_add(u64::from(self.external_predictive_inputs)));
        if !num_cells.is_some_and(|n| n <= u64::from(CellIdx::MAX)) {
            return invalid("column_dimensions", "Too many cells for a 32-bit cell index");
        }

        Ok(())
    }
}

impl fmt::Display for TemporalMemoryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Temporal Memory Parameters")?;
        writeln!(f, "    column_dimensions           = {:?}", self.column_dimensions)?;
        writeln!(f, "    cells_per_column            = {}", self.cells_per_column)?;
        writeln!(f, "    activation_threshold        = {}", self.activation_threshold)?;
        writeln!(f, "    initial_permanence          = {}", self.initial_permanence)?;
        writeln!(f, "    connected_permanence        = {}", self.connected_permanence)?;
        writeln!(f, "    min_threshold               = {}", self.min_threshold)?;
        writeln!(f, "    max_new_synapse_count       = {}", self.max_new_synapse_count)?;
        writeln!(f, "    permanence_increment        = {}", self.permanence_increment)?;
        writeln!(f, "    permanence_decrement        = {}", self.permanence_decrement)?;
        writeln!(f, "    predicted_segment_decrement = {}", self.predicted_segment_decrement)?;
        writeln!(f, "    max_segments_per_cell       = {}", self.max_segments_per_cell)?;
        writeln!(f, "    max_synapses_per_segment    = {}", self.max_synapses_per_segment)?;
        writeln!(f, "    seed                        = {}", self.seed)?;
        write!(
            f,
            "    external_predictive_inputs  = {}",
            self.external_predictive_inputs
        )
    }
}

/// The Temporal Memory algorithm.
///
/// Temporal Memory learns sequences by forming connections between
/// cells in different columns. It maintains a prediction of which
/// cells will become active in the next time step.
///
/// # Example
///
/// ```rust
/// use dendrite::algorithms::{TemporalMemory, TemporalMemoryParams};
/// use dendrite::types::Sdr;
///
/// let mut tm = TemporalMemory::new(TemporalMemoryParams {
///     column_dimensions: vec![100],
///     cells_per_column: 4,
///     ..Default::default()
/// }).unwrap();
///
/// let mut active_columns = Sdr::new(&[100]);
/// active_columns.set_sparse(&[1, 5, 10, 20]).unwrap();
///
/// tm.compute(&active_columns, true).unwrap();
///
/// // every column burst
/// assert_eq!(tm.active_cells().len(), 16);
/// assert_eq!(tm.winner_cells().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemory {
    // Configuration
    column_dimensions: Vec<UInt>,
    cells_per_column: UInt,
    num_columns: usize,
    num_cells: usize,
    activation_threshold: UInt,
    initial_permanence: Permanence,
    connected_permanence: Permanence,
    min_threshold: UInt,
    max_new_synapse_count: UInt,
    permanence_increment: Permanence,
    permanence_decrement: Permanence,
    predicted_segment_decrement: Permanence,
    max_segments_per_cell: SegmentIdx,
    max_synapses_per_segment: UInt,
    external_predictive_inputs: UInt,

    connections: Connections,

    // Cell state
    active_cells: Vec<CellIdx>,
    winner_cells: Vec<CellIdx>,
    predictive_cells: Vec<CellIdx>,

    // Dendrite state, valid between activate_dendrites and activate_cells
    segments_valid: bool,
    presynaptic_active: Vec<CellIdx>,
    presynaptic_winners: Vec<CellIdx>,
    active_segments: Vec<Segment>,
    matching_segments: Vec<Segment>,
    num_active_potential_synapses_for_segment: Vec<SynapseIdx>,

    anomaly: Real,
    rng: Random,
    iteration: u64,
}

impl TemporalMemory {
    /// Creates a new Temporal Memory with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if [`TemporalMemoryParams::validate`] fails.
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        params.validate()?;

        let num_columns: usize = params
            .column_dimensions
            .iter()
            .map(|&d| d as usize)
            .product();
        let num_cells = num_columns * params.cells_per_column as usize;
        let num_inputs = num_cells + params.external_predictive_inputs as usize;

        log::debug!(
            "creating temporal memory: {num_columns} columns x {} cells, {} external inputs",
            params.cells_per_column,
            params.external_predictive_inputs
        );

        Ok(Self {
            cells_per_column: params.cells_per_column,
            num_columns,
            num_cells,
            activation_threshold: params.activation_threshold,
            initial_permanence: params.initial_permanence,
            connected_permanence: params.connected_permanence,
            min_threshold: params.min_threshold,
            max_new_synapse_count: params.max_new_synapse_count,
            permanence_increment: params.permanence_increment,
            permanence_decrement: params.permanence_decrement,
            predicted_segment_decrement: params.predicted_segment_decrement,
            max_segments_per_cell: params.max_segments_per_cell as SegmentIdx,
            max_synapses_per_segment: params.max_synapses_per_segment,
            external_predictive_inputs: params.external_predictive_inputs,

            connections: Connections::new(ConnectionsParams {
                num_cells: num_inputs as CellIdx,
                connected_threshold: params.connected_permanence,
                ..Default::default()
            }),

            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            predictive_cells: Vec::new(),

            segments_valid: false,
            presynaptic_active: Vec::new(),
            presynaptic_winners: Vec::new(),
            active_segments: Vec::new(),
            matching_segments: Vec::new(),
            num_active_potential_synapses_for_segment: Vec::new(),

            anomaly: 0.0,
            rng: Random::new(params.seed),
            iteration: 0,
            column_dimensions: params.column_dimensions,
        })
    }

    /// Runs one full time step: dendrites, anomaly, then cells.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `active_columns` does not have one bit per column.
    pub fn compute(&mut self, active_columns: &Sdr, learn: bool) -> Result<()> {
        self.activate_dendrites(learn)?;
        self.activate_cells(active_columns, learn)
    }

    /// Like [`compute`](Self::compute), with external predictive context for the
    /// dendrite phase.
    ///
    /// # Errors
    ///
    /// See [`activate_dendrites_with_context`](Self::activate_dendrites_with_context)
    /// and [`activate_cells`](Self::activate_cells).
    pub fn compute_with_context(
        &mut self,
        active_columns: &Sdr,
        learn: bool,
        external_active: &Sdr,
        external_winners: &Sdr,
    ) -> Result<()> {
        self.activate_dendrites_with_context(learn, external_active, external_winners)?;
        self.activate_cells(active_columns, learn)
    }

    /// Computes segment activity from the previous step's active cells.
    ///
    /// Does nothing if the dendrites for the current step were already computed.
    /// A TM with external predictive inputs sees no external activity this step.
    ///
    /// # Errors
    ///
    /// Currently never fails; shares the signature of
    /// [`activate_dendrites_with_context`](Self::activate_dendrites_with_context).
    pub fn activate_dendrites(&mut self, learn: bool) -> Result<()> {
        self.activate_dendrites_inner(learn, &[], &[])
    }

    /// Computes segment activity from the previous step's active cells plus
    /// external context.
    ///
    /// External index `i` is presented to the graph as presynaptic cell
    /// `num_cells + i`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for non-empty context on a TM without external inputs,
    /// `DimensionMismatch` if a context SDR does not have
    /// `external_predictive_inputs` bits.
    pub fn activate_dendrites_with_context(
        &mut self,
        learn: bool,
        external_active: &Sdr,
        external_winners: &Sdr,
    ) -> Result<()> {
        if self.external_predictive_inputs == 0 {
            if external_active.get_sum() > 0 || external_winners.get_sum() > 0 {
                return Err(DendriteError::InvalidArgument {
                    name: "external_active",
                    message: "external_predictive_inputs is 0".to_string(),
                });
            }
            return self.activate_dendrites_inner(learn, &[], &[]);
        }

        for context in [external_active, external_winners] {
            if context.size() != self.external_predictive_inputs as usize {
                return Err(DendriteError::DimensionMismatch {
                    expected: vec![self.external_predictive_inputs],
                    actual: context.dimensions().to_vec(),
                });
            }
        }

        self.activate_dendrites_inner(
            learn,
            external_active.get_sparse(),
            external_winners.get_sparse(),
        )
    }

    fn activate_dendrites_inner(
        &mut self,
        learn: bool,
        external_active: &[CellIdx],
        external_winners: &[CellIdx],
    ) -> Result<()> {
        if self.segments_valid {
            return Ok(());
        }
        let offset = self.num_cells as CellIdx;
        self.presynaptic_active = self.active_cells.clone();
        self.presynaptic_active
            .extend(external_active.iter().map(|&i| i + offset));
        self.presynaptic_winners = self.winner_cells.clone();
        self.presynaptic_winners
            .extend(external_winners.iter().map(|&i| i + offset));

        self.connections.tick(learn);
        let activity = self
            .connections
            .compute_segment_activity(&self.presynaptic_active);

        let connections = &self.connections;
        let mut active_segments: Vec<Segment> = (0..activity.connected.len())
            .filter(|&s| UInt::from(activity.connected[s]) >= self.activation_threshold)
            .map(|s| s as Segment)
            .collect();
        active_segments.sort_by(|&a, &b| connections.compare_segments(a, b));

        let mut matching_segments: Vec<Segment> = (0..activity.potential.len())
            .filter(|&s| UInt::from(activity.potential[s]) >= self.min_threshold)
            .map(|s| s as Segment)
            .collect();
        matching_segments.sort_by(|&a, &b| connections.compare_segments(a, b));

        self.predictive_cells = active_segments
            .iter()
            .map(|&s| connections.cell_for_segment(s))
            .collect();
        self.predictive_cells.dedup();

        self.active_segments = active_segments;
        self.matching_segments = matching_segments;
        self.num_active_potential_synapses_for_segment = activity.potential;
        self.segments_valid = true;
        Ok(())
    }

    /// Activates cells for the given active columns and, with `learn`, adapts
    /// the graph.
    ///
    /// Runs [`activate_dendrites`](Self::activate_dendrites) first if it has not
    /// been run for this step. The raw anomaly of the step is computed before any
    /// cell changes state.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `active_columns` does not have one bit per column.
    pub fn activate_cells(&mut self, active_columns: &Sdr, learn: bool) -> Result<()> {
        if active_columns.size() != self.num_columns {
            return Err(DendriteError::DimensionMismatch {
                expected: self.column_dimensions.clone(),
                actual: active_columns.dimensions().to_vec(),
            });
        }
        if !self.segments_valid {
            self.activate_dendrites_inner(learn, &[], &[])?;
        }

        let columns = active_columns.get_sparse();
        let predicted_columns = self.columns_of_sorted_cells(&self.predictive_cells);
        self.anomaly = raw_anomaly_score(columns, &predicted_columns);

        let presynaptic_active = std::mem::take(&mut self.presynaptic_active);
        let prev_active = self.input_sdr(presynaptic_active);
        let prev_winners = std::mem::take(&mut self.presynaptic_winners);
        let active_segments = std::mem::take(&mut self.active_segments);
        let matching_segments = std::mem::take(&mut self.matching_segments);

        // Column of each segment, fixed before learning can free and reuse slots.
        let active_segment_columns: Vec<UInt> = active_segments
            .iter()
            .map(|&s| self.column_for_segment(s))
            .collect();
        let matching_segment_columns: Vec<UInt> = matching_segments
            .iter()
            .map(|&s| self.column_for_segment(s))
            .collect();

        self.active_cells.clear();
        self.winner_cells.clear();

        let (mut c, mut a, mut m) = (0, 0, 0);
        loop {
            let next = [
                columns.get(c).copied(),
                active_segment_columns.get(a).copied(),
                matching_segment_columns.get(m).copied(),
            ]
            .into_iter()
            .flatten()
            .min();
            let Some(column) = next else {
                break;
            };

            let is_active = columns.get(c) == Some(&column);
            if is_active {
                c += 1;
            }
            let a_start = a;
            while active_segment_columns.get(a) == Some(&column) {
                a += 1;
            }
            let m_start = m;
            while matching_segment_columns.get(m) == Some(&column) {
                m += 1;
            }
            let column_active = &active_segments[a_start..a];
            let column_matching = &matching_segments[m_start..m];

            if is_active {
                if column_active.is_empty() {
                    self.burst_column(column, column_matching, &prev_active, &prev_winners, learn)?;
                } else {
                    self.activate_predicted_column(column_active, &prev_active, &prev_winners, learn)?;
                }
            } else if learn {
                self.punish_predicted_column(column_matching, &prev_active)?;
            }
        }

        self.segments_valid = false;
        self.iteration += 1;
        Ok(())
    }

    /// Activates the cells of a correctly predicted column and reinforces the
    /// segments that predicted them.
    fn activate_predicted_column(
        &mut self,
        column_active_segments: &[Segment],
        prev_active: &Sdr,
        prev_winners: &[CellIdx],
        learn: bool,
    ) -> Result<()> {
        for &segment in column_active_segments {
            let cell = self.connections.cell_for_segment(segment);
            // segments are sorted by cell, so a cell's segments are adjacent
            if self.active_cells.last() != Some(&cell) {
                self.active_cells.push(cell);
                self.winner_cells.push(cell);
            }

            if learn {
                self.learn_on_segment(segment, prev_active, prev_winners)?;
            }
        }
        Ok(())
    }

    /// Activates every cell of an unpredicted column and picks one winner.
    fn burst_column(
        &mut self,
        column: UInt,
        column_matching_segments: &[Segment],
        prev_active: &Sdr,
        prev_winners: &[CellIdx],
        learn: bool,
    ) -> Result<()> {
        let cells = self.cell_range(column);
        self.active_cells.extend(cells.clone());

        // first segment with the highest matching count
        let mut best_matching: Option<(Segment, SynapseIdx)> = None;
        for &segment in column_matching_segments {
            let count = self.num_active_potential_synapses_for_segment[segment as usize];
            if best_matching.map_or(true, |(_, best)| count > best) {
                best_matching = Some((segment, count));
            }
        }

        let winner = if let Some((segment, _)) = best_matching {
            self.connections.cell_for_segment(segment)
        } else if let Some(&cell) = prev_winners.iter().find(|&&c| cells.contains(&c)) {
            cell
        } else {
            self.least_used_cell(column)
        };
        self.winner_cells.push(winner);

        if !learn {
            return Ok(());
        }

        if let Some((segment, _)) = best_matching {
            self.learn_on_segment(segment, prev_active, prev_winners)?;
        } else {
            let num_grow = (self.max_new_synapse_count as usize).min(prev_winners.len());
            if num_grow > 0 {
                let segment = self
                    .connections
                    .create_segment(winner, self.max_segments_per_cell)?;
                self.connections.grow_synapses(
                    segment,
                    prev_winners,
                    self.initial_permanence,
                    &mut self.rng,
                    Some(num_grow),
                    Some(self.max_synapses_per_segment as usize),
                )?;
            }
        }
        Ok(())
    }

    /// Weakens the matching segments of a column that was predicted but did not
    /// become active.
    fn punish_predicted_column(
        &mut self,
        column_matching_segments: &[Segment],
        prev_active: &Sdr,
    ) -> Result<()> {
        if self.predicted_segment_decrement <= 0.0 {
            return Ok(());
        }
        for &segment in column_matching_segments {
            self.connections.adapt_segment(
                segment,
                prev_active,
                -self.predicted_segment_decrement,
                0.0,
                true,
                self.min_threshold,
            )?;
        }
        Ok(())
    }

    /// Hebbian update on a segment followed by growth toward previous winners.
    fn learn_on_segment(
        &mut self,
        segment: Segment,
        prev_active: &Sdr,
        prev_winners: &[CellIdx],
    ) -> Result<()> {
        let survived = self.connections.adapt_segment(
            segment,
            prev_active,
            self.permanence_increment,
            self.permanence_decrement,
            true,
            self.min_threshold,
        )?;
        if !survived {
            return Ok(());
        }

        let matching = self.num_active_potential_synapses_for_segment[segment as usize];
        let num_grow = (self.max_new_synapse_count as usize).saturating_sub(matching as usize);
        if num_grow > 0 {
            self.connections.grow_synapses(
                segment,
                prev_winners,
                self.initial_permanence,
                &mut self.rng,
                Some(num_grow),
                Some(self.max_synapses_per_segment as usize),
            )?;
        }
        Ok(())
    }

    /// Picks uniformly among the column's cells with the fewest segments.
    fn least_used_cell(&mut self, column: UInt) -> CellIdx {
        let cells = self.cell_range(column);
        let fewest = cells
            .clone()
            .map(|cell| self.connections.num_segments_on_cell(cell))
            .min()
            .unwrap_or(0);

        let candidates: Vec<CellIdx> = cells
            .clone()
            .filter(|&cell| self.connections.num_segments_on_cell(cell) == fewest)
            .collect();
        self.rng.choose(&candidates).copied().unwrap_or(cells.start)
    }

    /// Clears the cell state at a sequence boundary. Learned synapses are kept.
    pub fn reset(&mut self) {
        log::trace!("temporal memory reset at iteration {}", self.iteration);
        self.active_cells.clear();
        self.winner_cells.clear();
        self.predictive_cells.clear();
        self.presynaptic_active.clear();
        self.presynaptic_winners.clear();
        self.active_segments.clear();
        self.matching_segments.clear();
        self.num_active_potential_synapses_for_segment.clear();
        self.segments_valid = false;
    }

    // ========================================================================
    // Cell/Column utilities
    // ========================================================================

    #[inline]
    fn cell_range(&self, column: UInt) -> std::ops::Range<CellIdx> {
        let start = column * self.cells_per_column;
        start..start + self.cells_per_column
    }

    #[inline]
    fn column_for_segment(&self, segment: Segment) -> UInt {
        self.connections.cell_for_segment(segment) / self.cells_per_column
    }

    fn columns_of_sorted_cells(&self, cells: &[CellIdx]) -> Vec<UInt> {
        let mut columns: Vec<UInt> = cells.iter().map(|&c| c / self.cells_per_column).collect();
        columns.dedup();
        columns
    }

    fn input_sdr(&self, sorted_cells: Vec<CellIdx>) -> Sdr {
        let mut sdr = Sdr::new(&[self.connections.num_cells() as UInt]);
        sdr.set_sparse_unchecked(sorted_cells);
        sdr
    }

    fn cells_sdr(&self, cells: &[CellIdx]) -> Sdr {
        let mut dimensions = self.column_dimensions.clone();
        dimensions.push(self.cells_per_column);
        let mut sdr = Sdr::new(&dimensions);
        sdr.set_sparse_unchecked(cells.to_vec());
        sdr
    }

    fn check_cell(&self, cell: CellIdx) -> Result<()> {
        if (cell as usize) < self.num_cells {
            Ok(())
        } else {
            Err(DendriteError::InvalidArgument {
                name: "cell",
                message: format!("cell {cell} out of range (num_cells = {})", self.num_cells),
            })
        }
    }

    /// Returns the cells belonging to `column`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `column` is out of range.
    pub fn cells_for_column(&self, column: UInt) -> Result<Vec<CellIdx>> {
        if column as usize >= self.num_columns {
            return Err(DendriteError::InvalidArgument {
                name: "column",
                message: format!("column {column} out of range (num_columns = {})", self.num_columns),
            });
        }
        Ok(self.cell_range(column).collect())
    }

    /// Returns the column that `cell` belongs to.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `cell` is out of range.
    pub fn column_for_cell(&self, cell: CellIdx) -> Result<UInt> {
        self.check_cell(cell)?;
        Ok(cell / self.cells_per_column)
    }

    /// Maps a cell SDR to the SDR of columns containing at least one of its cells.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `cells` does not have one bit per cell.
    pub fn cells_to_columns(&self, cells: &Sdr) -> Result<Sdr> {
        if cells.size() != self.num_cells {
            return Err(DendriteError::DimensionMismatch {
                expected: vec![self.num_cells as UInt],
                actual: cells.dimensions().to_vec(),
            });
        }
        let mut columns = Sdr::new(&self.column_dimensions);
        columns.set_sparse_unchecked(self.columns_of_sorted_cells(cells.get_sparse()));
        Ok(columns)
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the column dimensions.
    pub fn column_dimensions(&self) -> &[UInt] {
        &self.column_dimensions
    }

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Returns the number of cells per column.
    pub fn cells_per_column(&self) -> UInt {
        self.cells_per_column
    }

    /// Returns the total number of cells.
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Returns the currently active cells, ascending.
    pub fn active_cells(&self) -> &[CellIdx] {
        &self.active_cells
    }

    /// Returns the winner cells from the last step, ascending.
    pub fn winner_cells(&self) -> &[CellIdx] {
        &self.winner_cells
    }

    /// Returns the cells made predictive by the most recent dendrite phase.
    ///
    /// After [`compute`](Self::compute) these are the predictions that step was
    /// scored against. Call [`activate_dendrites`](Self::activate_dendrites) to
    /// get the predictions for the next step.
    pub fn predictive_cells(&self) -> &[CellIdx] {
        &self.predictive_cells
    }

    /// Returns the active cells as an SDR shaped `[column dims..., cells_per_column]`.
    pub fn get_active_cells_sdr(&self) -> Sdr {
        self.cells_sdr(&self.active_cells)
    }

    /// Returns the winner cells as an SDR.
    pub fn get_winner_cells_sdr(&self) -> Sdr {
        self.cells_sdr(&self.winner_cells)
    }

    /// Returns the predictive cells as an SDR.
    pub fn get_predictive_cells_sdr(&self) -> Sdr {
        self.cells_sdr(&self.predictive_cells)
    }

    /// Returns the active segments of the current dendrite phase.
    pub fn active_segments(&self) -> &[Segment] {
        &self.active_segments
    }

    /// Returns the matching segments of the current dendrite phase.
    pub fn matching_segments(&self) -> &[Segment] {
        &self.matching_segments
    }

    /// Returns the raw anomaly score of the last step.
    pub fn anomaly(&self) -> Real {
        self.anomaly
    }

    /// Returns a reference to the connections.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Returns the activation threshold.
    pub fn activation_threshold(&self) -> UInt {
        self.activation_threshold
    }

    /// Returns the initial permanence.
    pub fn initial_permanence(&self) -> Permanence {
        self.initial_permanence
    }

    /// Returns the connected permanence threshold.
    pub fn connected_permanence(&self) -> Permanence {
        self.connected_permanence
    }

    /// Returns the minimum threshold for matching.
    pub fn min_threshold(&self) -> UInt {
        self.min_threshold
    }

    /// Returns the maximum number of synapses grown per segment per step.
    pub fn max_new_synapse_count(&self) -> UInt {
        self.max_new_synapse_count
    }

    /// Returns the permanence increment.
    pub fn permanence_increment(&self) -> Permanence {
        self.permanence_increment
    }

    /// Returns the permanence decrement.
    pub fn permanence_decrement(&self) -> Permanence {
        self.permanence_decrement
    }

    /// Returns the predicted segment decrement.
    pub fn predicted_segment_decrement(&self) -> Permanence {
        self.predicted_segment_decrement
    }

    /// Returns the maximum number of segments per cell.
    pub fn max_segments_per_cell(&self) -> SegmentIdx {
        self.max_segments_per_cell
    }

    /// Returns the maximum number of synapses per segment.
    pub fn max_synapses_per_segment(&self) -> UInt {
        self.max_synapses_per_segment
    }

    /// Returns the number of external predictive inputs.
    pub fn external_predictive_inputs(&self) -> UInt {
        self.external_predictive_inputs
    }

    /// Returns the number of completed steps.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}
