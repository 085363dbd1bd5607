use std::{cmp::Reverse, collections::BinaryHeap};

use serde::{Deserialize, Serialize};

/// How many values a [`Triple`] keeps.
pub const TRIPLE_LEN: usize = 3;

/// The reduced form of a [`crate::Batch`]: its largest values in ascending order.
///
/// A triple holds exactly [`TRIPLE_LEN`] values, or all of them when the batch
/// was shorter than that. Ties are broken by value only; the position a value
/// had in the batch is not preserved.
///
/// Workers produce triples and move them to their paired accumulator, which
/// folds [`Triple::sum`] into the running total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple(Vec<u32>);

impl Triple {
    /// Wrap values that are already the ascending top selection of a batch.
    pub(crate) fn from_sorted(values: Vec<u32>) -> Self {
        debug_assert!(values.len() <= TRIPLE_LEN);
        debug_assert!(values.is_sorted());
        Self(values)
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

    /// Scalar contribution of this triple to the running total.
    pub fn sum(&self) -> u64 {
        self.0.iter().map(|v| u64::from(*v)).sum()
    }
}

/// Select the `k` largest values of `values`, returned in ascending order.
///
/// Keeps a bounded min-heap of size `k`, so the cost is `O(n log k)` and the
/// input is never copied or sorted as a whole. The output is the same as
/// sorting ascending and taking the last `min(k, n)` elements.
pub fn top_k(values: &[u32], k: usize) -> Vec<u32> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k + 1);
    for &v in values {
        if heap.len() < k {
            heap.push(Reverse(v));
        } else if let Some(Reverse(smallest)) = heap.peek() {
            if v > *smallest {
                heap.pop();
                heap.push(Reverse(v));
            }
        }
    }

    // Sorting `Reverse` ascending yields the values descending
    let mut top: Vec<u32> = heap.into_sorted_vec().into_iter().map(|r| r.0).collect();
    top.reverse();
    top
}
