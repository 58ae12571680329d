//! Raw anomaly score.
//!
//! The score is the fraction of active columns that were not predicted on the
//! previous step. Smoothing the score into a likelihood is left to consumers.

use crate::types::{ElemSparse, Real, Sdr};

use std::cmp::Ordering;

/// Computes the raw anomaly score of `active` given `predicted`.
///
/// Returns 0.0 when every active bit was predicted, 1.0 when none were, and 0.0
/// for an empty active set.
///
/// # Example
///
/// ```rust
/// use dendrite::algorithms::compute_raw_anomaly_score;
/// use dendrite::types::Sdr;
///
/// let active = Sdr::from_sparse(&[100], &[1, 2, 3, 4]).unwrap();
/// let predicted = Sdr::from_sparse(&[100], &[3, 4, 5]).unwrap();
///
/// assert_eq!(compute_raw_anomaly_score(&active, &predicted), 0.5);
/// ```
pub fn compute_raw_anomaly_score(active: &Sdr, predicted: &Sdr) -> Real {
    raw_anomaly_score(active.get_sparse(), predicted.get_sparse())
}

/// Raw anomaly score over sorted index slices.
pub(crate) fn raw_anomaly_score(active: &[ElemSparse], predicted: &[ElemSparse]) -> Real {
    if active.is_empty() {
        return 0.0;
    }

    let (mut i, mut j, mut predicted_active) = (0, 0, 0usize);
    while i < active.len() && j < predicted.len() {
        match active[i].cmp(&predicted[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                predicted_active += 1;
                i += 1;
                j += 1;
            }
        }
    }

    (active.len() - predicted_active) as Real / active.len() as Real
}
