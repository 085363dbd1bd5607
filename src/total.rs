use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// The `RunningTotal` is the single shared accumulator of the pipeline.
///
/// It is an explicitly owned handle: cloning it is cheap and every clone points
/// at the same counters. The pipeline hands one clone to each accumulator task
/// and one to the reporter when they are constructed.
///
/// # Update discipline
///
/// - The total only ever grows, and only through [`RunningTotal::add`], which
///   is a hardware `fetch_add`. Concurrent adds from any number of tasks are
///   linearizable, so no update is ever lost and no lock is involved.
/// - [`RunningTotal::get`] is a single atomic load. A reader never observes a
///   half-applied add, and successive reads never decrease.
///
/// Next to the total, the handle counts how many contributions were folded in.
/// The two counters are independent atomics: reading both is not a consistent
/// snapshot while tasks are still running.
///
/// # Example
/// ```rust
/// use sumpipe::RunningTotal;
///
/// let total = RunningTotal::new();
/// let writer = total.clone();
/// writer.add(24);
/// writer.add(12);
/// assert_eq!(total.get(), 36);
/// assert_eq!(total.contributions(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunningTotal {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    contributions: AtomicU64,
}

impl RunningTotal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically fold one contribution into the total.
    pub fn add(&self, amount: u64) {
        self.add_many(amount, 1);
    }

    /// Atomically fold `count` contributions whose sums add up to `amount`.
    ///
    /// Used by accumulators that drain several triples at once: the total sees
    /// a single add, the contribution counter still counts every triple.
    /// `amount` is added even when `count` is zero.
    pub fn add_many(&self, amount: u64, count: u64) {
        self.inner.total.fetch_add(amount, Ordering::AcqRel);
        self.inner.contributions.fetch_add(count, Ordering::Relaxed);
    }

    /// Current value of the total.
    pub fn get(&self) -> u64 {
        self.inner.total.load(Ordering::Acquire)
    }

    /// Number of contributions folded so far.
    pub fn contributions(&self) -> u64 {
        self.inner.contributions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let total = RunningTotal::new();
        assert_eq!(total.get(), 0);
        assert_eq!(total.contributions(), 0);
    }

    #[test]
    fn clones_share_state() {
        let a = RunningTotal::new();
        let b = a.clone();
        a.add(3);
        b.add(9);
        assert_eq!(a.get(), 12);
        assert_eq!(b.get(), 12);
        assert_eq!(a.contributions(), 2);
    }

    #[test]
    fn add_many_counts_every_contribution() {
        let total = RunningTotal::new();
        total.add_many(50, 4);
        total.add_many(0, 0);
        assert_eq!(total.get(), 50);
        assert_eq!(total.contributions(), 4);
    }

    #[test]
    fn add_many_never_drops_an_amount() {
        let total = RunningTotal::new();
        total.add_many(7, 0);
        assert_eq!(total.get(), 7);
        assert_eq!(total.contributions(), 0);
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let total = RunningTotal::new();
        let threads = 8;
        let adds_per_thread = 10_000;

        std::thread::scope(|s| {
            for t in 0..threads {
                let total = total.clone();
                s.spawn(move || {
                    for _ in 0..adds_per_thread {
                        total.add(t + 1);
                    }
                });
            }
        });

        // sum of (t + 1) for t in 0..8 is 36
        assert_eq!(total.get(), 36 * adds_per_thread);
        assert_eq!(total.contributions(), threads * adds_per_thread);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_never_decrease_under_concurrent_adds() {
        let total = RunningTotal::new();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let total = total.clone();
                tokio::spawn(async move {
                    for _ in 0..5_000 {
                        total.add(7);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let mut last = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            let now = total.get();
            assert!(now >= last, "total went from {last} to {now}");
            last = now;
            tokio::task::yield_now().await;
        }
        for w in writers {
            w.await.unwrap();
        }
        assert_eq!(total.get(), 4 * 5_000 * 7);
    }
}
