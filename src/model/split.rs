//! Seeded train/test partitioning

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Rows used for fitting
    pub train: Vec<usize>,
    /// Held-out rows used for evaluation
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a fixed seed and hold out `ceil(n * test_fraction)`.
///
/// The same `(n, test_fraction, seed)` always yields the same partition.
///
/// # Errors
///
/// Returns `Error::TrainingFailure` if either side would be empty
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(Error::TrainingFailure(format!(
            "cannot split {n} samples with test fraction {test_fraction}: both sides need rows"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let train = order.split_off(n_test);
    Ok(Split { train, test: order })
}
