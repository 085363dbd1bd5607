use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::triple::{TRIPLE_LEN, Triple, top_k};

/// Number of values in every generated [`Batch`].
pub const ELEMENT_COUNT: usize = 10;

/// Exclusive upper bound of generated values.
pub const MAX_ELEMENT_VALUE: u32 = 10;

/// A `Batch` is the unit of work that flows through the pipeline.
///
/// Batches are created by the generator, handed to exactly one worker and
/// dropped once that worker has reduced them. They are never mutated after
/// creation: reducing a batch only reads it.
///
/// Generated batches always hold [`ELEMENT_COUNT`] values drawn from
/// `[0, MAX_ELEMENT_VALUE)`, but any sequence can be wrapped with
/// [`Batch::from`], which is how tests feed known inputs.
///
/// ## Example
/// ```rust
/// use sumpipe::Batch;
///
/// let batch = Batch::from(vec![4, 1, 7, 2, 9, 0, 3, 8, 5, 6]);
/// assert_eq!(batch.len(), 10);
/// assert_eq!(batch.reduce().sum(), 24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch(Vec<u32>);

impl Batch {
    /// Draw a new batch of [`ELEMENT_COUNT`] independent values.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self(
            (0..ELEMENT_COUNT)
                .map(|_| rng.random_range(0..MAX_ELEMENT_VALUE))
                .collect(),
        )
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reduce this batch to its [`Triple`] of largest values.
    pub fn reduce(&self) -> Triple {
        Triple::from_sorted(top_k(&self.0, TRIPLE_LEN))
    }
}

impl From<Vec<u32>> for Batch {
    fn from(values: Vec<u32>) -> Self {
        Self(values)
    }
}

/// Endless source of random batches, the default input of the pipeline.
///
/// The RNG is seeded once, either from a fixed seed (reproducible runs) or
/// from the wall clock.
pub struct RandomBatches {
    rng: StdRng,
}

impl RandomBatches {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from the current wall-clock time.
    pub fn from_clock() -> Self {
        // A clock set before the epoch only costs us randomness quality.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::seeded(seed)
    }
}

impl Iterator for RandomBatches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        Some(Batch::random(&mut self.rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_batch_has_fixed_length_and_bounded_values() {
        let mut source = RandomBatches::seeded(7);
        for _ in 0..100 {
            let batch = source.next().unwrap();
            assert_eq!(batch.len(), ELEMENT_COUNT);
            assert!(batch.values().iter().all(|v| *v < MAX_ELEMENT_VALUE));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a: Vec<Batch> = RandomBatches::seeded(42).take(20).collect();
        let b: Vec<Batch> = RandomBatches::seeded(42).take(20).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let a: Vec<Batch> = RandomBatches::seeded(1).take(20).collect();
        let b: Vec<Batch> = RandomBatches::seeded(2).take(20).collect();
        assert_ne!(a, b);
    }
}
