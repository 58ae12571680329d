//! Utility modules.
//!
//! Currently the seeded random number generator shared by the learning algorithms.

mod random;

pub use random::Random;
