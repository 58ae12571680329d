//! Sparse Distributed Representation (SDR).
//!
//! The input and output medium of the sequence engine: a fixed-shape binary vector
//! stored as a sorted list of its active indices. Cell and column sets handed to and
//! returned from [`TemporalMemory`](crate::algorithms::TemporalMemory) use this type.

use crate::error::{DendriteError, Result};
use crate::types::{ElemDense, ElemSparse, Real, UInt};
use crate::utils::Random;

use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense SDR data (one byte per bit, 0 or 1).
pub type SdrDense = Vec<ElemDense>;

/// Sparse SDR data (sorted, unique indices of active bits).
pub type SdrSparse = Vec<ElemSparse>;

/// Sparse Distributed Representation.
///
/// A binary vector over a (possibly multi-dimensional) shape. Only the active
/// indices are stored, always sorted ascending and free of duplicates, so
/// membership tests are a binary search.
///
/// # Example
///
/// ```rust
/// use dendrite::types::Sdr;
///
/// let mut sdr = Sdr::new(&[10, 10]);
/// sdr.set_sparse(&[1, 4, 8, 15, 42]).unwrap();
///
/// assert_eq!(sdr.get_sum(), 5);
/// assert!(sdr.contains(42));
/// assert!(!sdr.contains(43));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sdr {
    dimensions: Vec<UInt>,
    size: usize,
    sparse: SdrSparse,
}

impl Sdr {
    /// Creates an all-zero SDR with the given shape.
    ///
    /// A single dimension of size 0 is accepted as an empty placeholder.
    ///
    /// # Panics
    ///
    /// Panics if `dimensions` is empty, or if a multi-dimensional shape contains a zero.
    #[must_use]
    pub fn new(dimensions: &[UInt]) -> Self {
        assert!(!dimensions.is_empty(), "Dimensions cannot be empty");
        if dimensions.len() > 1 {
            assert!(
                dimensions.iter().all(|&d| d > 0),
                "Multi-dimensional SDR cannot have a zero dimension: {dimensions:?}"
            );
        }

        Self {
            dimensions: dimensions.to_vec(),
            size: dimensions.iter().map(|&d| d as usize).product(),
            sparse: Vec::new(),
        }
    }

    /// Creates an SDR and sets its active indices in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the indices are unsorted, duplicated or out of bounds.
    pub fn from_sparse(dimensions: &[UInt], indices: &[ElemSparse]) -> Result<Self> {
        let mut sdr = Self::new(dimensions);
        sdr.set_sparse(indices)?;
        Ok(sdr)
    }

    /// Returns the shape of this SDR.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> &[UInt] {
        &self.dimensions
    }

    /// Returns the total number of bits.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Deactivates every bit.
    pub fn zero(&mut self) {
        self.sparse.clear();
    }

    /// Sets the active bits from sorted, unique indices.
    ///
    /// # Errors
    ///
    /// Returns an error if indices are not sorted, contain duplicates, or are out of bounds.
    pub fn set_sparse(&mut self, indices: &[ElemSparse]) -> Result<()> {
        self.validate_sparse(indices)?;
        self.sparse.clear();
        self.sparse.extend_from_slice(indices);
        Ok(())
    }

    /// Sets indices already known to be sorted, unique and in range.
    pub(crate) fn set_sparse_unchecked(&mut self, indices: SdrSparse) {
        debug_assert!(self.validate_sparse(&indices).is_ok());
        self.sparse = indices;
    }

    fn validate_sparse(&self, indices: &[ElemSparse]) -> Result<()> {
        if let Some(&last) = indices.last() {
            if last as usize >= self.size {
                return Err(DendriteError::InvalidArgument {
                    name: "sparse",
                    message: format!("index {last} out of bounds for SDR of size {}", self.size),
                });
            }
        }
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DendriteError::InvalidSdrData(
                "Sparse indices must be sorted and unique".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the active indices, sorted ascending.
    #[inline]
    #[must_use]
    pub fn get_sparse(&self) -> &[ElemSparse] {
        &self.sparse
    }

    /// Sets the value from a dense array where any non-zero byte is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the length does not match the SDR size.
    pub fn set_dense(&mut self, data: &[ElemDense]) -> Result<()> {
        if data.len() != self.size {
            return Err(DendriteError::DimensionMismatch {
                expected: vec![self.size as UInt],
                actual: vec![data.len() as UInt],
            });
        }
        self.sparse = data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(i, _)| i as ElemSparse)
            .collect();
        Ok(())
    }

    /// Returns the dense representation.
    #[must_use]
    pub fn get_dense(&self) -> SdrDense {
        let mut dense = vec![0; self.size];
        for &idx in &self.sparse {
            dense[idx as usize] = 1;
        }
        dense
    }

    /// Returns true if bit `index` is active.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: ElemSparse) -> bool {
        self.sparse.binary_search(&index).is_ok()
    }

    /// Returns the number of active bits.
    #[inline]
    #[must_use]
    pub fn get_sum(&self) -> usize {
        self.sparse.len()
    }

    /// Returns the fraction of active bits.
    #[must_use]
    pub fn get_sparsity(&self) -> Real {
        if self.size == 0 {
            return 0.0;
        }
        self.get_sum() as Real / self.size as Real
    }

    /// Returns the number of bits active in both SDRs.
    #[must_use]
    pub fn get_overlap(&self, other: &Sdr) -> usize {
        let (a, b) = (&self.sparse, &other.sparse);
        let (mut i, mut j, mut count) = (0, 0, 0);

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }

        count
    }

    /// Activates a random subset of `round(size * sparsity)` bits.
    pub fn randomize(&mut self, sparsity: Real, rng: &mut Random) {
        let num_active = ((self.size as Real) * sparsity.clamp(0.0, 1.0)).round() as usize;
        let mut indices: SdrSparse = rng
            .sample_indices(self.size, num_active)
            .into_iter()
            .map(|i| i as ElemSparse)
            .collect();
        indices.sort_unstable();
        self.sparse = indices;
    }
}

impl fmt::Debug for Sdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sdr")
            .field("dimensions", &self.dimensions)
            .field("sparse", &self.sparse)
            .finish()
    }
}

impl fmt::Display for Sdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SDR( ")?;
        for (i, d) in self.dimensions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, " ) ")?;
        for (i, idx) in self.sparse.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        Ok(())
    }
}
