//! Task bodies of the pipeline.
//!
//! Every task follows the same shape: a main loop future raced against the
//! shared shutdown signal with `tokio::select!`. Whatever the loop is waiting
//! on (a timer, a full channel, an empty channel) the task stops as soon as
//! shutdown is signalled and drops its channel ends on the way out.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use tokio::sync::{
    Mutex,
    mpsc::{Receiver, Sender, channel},
    watch,
};
use tokio::task::JoinHandle;

use crate::{Batch, Reporter, RunningTotal, TotalReport, Triple};

/// Buffer of each worker's private triple channel.
pub const TRIPLE_CHANNEL_CAPACITY: usize = 4;

/// Upper bound on triples an accumulator folds in one atomic add.
pub const ACCUMULATOR_DRAIN_LIMIT: usize = 16;

/// Shared execution state handed to every task.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Broadcasts the signal to stop all tasks.
    pub shutdown: watch::Receiver<bool>,
}

impl ExecutionContext {
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown: rx }, tx)
    }

    /// Resolves once shutdown is signalled or the sending side is gone.
    pub async fn cancelled(&mut self) {
        // An Err means the sender was dropped, which also means stop
        let _ = self.shutdown.wait_for(|stop| *stop).await;
    }
}

/// Worker side of the shared batch channel. Every worker holds a clone and
/// whichever worker gets the lock first takes the next batch, so each batch is
/// dequeued exactly once.
pub type SharedBatches = Arc<Mutex<Receiver<Batch>>>;

/// Publishes batches from `source` until it runs dry or shutdown.
///
/// `send` waits while the channel is full, which keeps the generator at most
/// one buffer ahead of the workers. When the source ends the sender is
/// dropped, closing the channel so the workers can drain it and stop.
pub async fn generator_task<S>(
    mut ctx: ExecutionContext,
    mut source: S,
    batches: Sender<Batch>,
    interval: Duration,
    generated: Arc<AtomicU64>,
) where
    S: Iterator<Item = Batch> + Send,
{
    let main_task = async {
        tracing::debug!("Generator started.");
        while let Some(batch) = source.next() {
            if batches.send(batch).await.is_err() {
                tracing::debug!("Generator found no workers left.");
                return;
            }
            generated.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(interval).await;
        }
        tracing::debug!("Generator source exhausted, closing the batch channel.");
    };

    tokio::select! {
        _ = main_task => {}
        _ = ctx.cancelled() => {
            tracing::debug!("Generator received shutdown signal.");
        }
    };
}

/// Reduces batches taken from the shared channel and publishes each triple on
/// this worker's own channel.
///
/// Ends when the shared channel is closed and empty, when the paired
/// accumulator is gone, or on shutdown.
pub async fn worker_task(
    mut ctx: ExecutionContext,
    id: usize,
    batches: SharedBatches,
    triples: Sender<Triple>,
) {
    let main_task = async {
        tracing::debug!("Worker {id} started.");
        loop {
            // The guard is released before reducing so other workers can
            // take the next batch meanwhile
            let next = batches.lock().await.recv().await;
            let Some(batch) = next else {
                tracing::debug!("Worker {id} found the batch channel closed.");
                break;
            };

            if triples.send(batch.reduce()).await.is_err() {
                tracing::debug!("Worker {id} lost its accumulator.");
                break;
            }
        }
    };

    tokio::select! {
        _ = main_task => {}
        _ = ctx.cancelled() => {}
    };

    tracing::debug!("Worker {id} shutting down.");
}

/// Folds every triple a worker publishes into the running total.
///
/// After the first triple, whatever is already queued is drained too (up to
/// [`ACCUMULATOR_DRAIN_LIMIT`]) and folded with a single atomic add.
pub async fn accumulator_task(
    mut ctx: ExecutionContext,
    id: usize,
    mut triples: Receiver<Triple>,
    total: RunningTotal,
) {
    let main_task = async {
        tracing::debug!("Accumulator {id} started.");
        // Stops when the paired worker drops its sender
        while let Some(first) = triples.recv().await {
            let mut sum = first.sum();
            let mut count = 1;

            while count < ACCUMULATOR_DRAIN_LIMIT {
                match triples.try_recv() {
                    Ok(triple) => {
                        sum += triple.sum();
                        count += 1;
                    }
                    Err(_) => break,
                }
            }

            total.add_many(sum, count as u64);
        }
    };

    tokio::select! {
        _ = main_task => {}
        _ = ctx.cancelled() => {}
    };

    tracing::debug!("Accumulator {id} shutting down.");
}

/// Emits the running total right away, then once per `interval`, until
/// shutdown.
///
/// Reporter failures are logged and the loop keeps going.
pub async fn reporter_task<R: Reporter>(
    mut ctx: ExecutionContext,
    reporter: R,
    total: RunningTotal,
    interval: Duration,
) {
    let main_task = async {
        tracing::debug!("Reporter started.");
        loop {
            let report = TotalReport::from(total.get());
            if let Err(e) = reporter.report(&report).await {
                tracing::warn!("Failed to report total {}: {e}", report.total);
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::select! {
        _ = main_task => {}
        _ = ctx.cancelled() => {
            tracing::debug!("Reporter received shutdown signal.");
        }
    };
}

/// Spawns `workers` worker tasks on the shared channel, returning their
/// handles and the receiving end of each worker's private channel.
pub fn spawn_workers(
    ctx: &ExecutionContext,
    workers: usize,
    batches: Receiver<Batch>,
) -> (Vec<JoinHandle<()>>, Vec<Receiver<Triple>>) {
    let shared: SharedBatches = Arc::new(Mutex::new(batches));

    (0..workers)
        .map(|id| {
            let (tx, rx) = channel(TRIPLE_CHANNEL_CAPACITY);
            let handle = tokio::spawn(worker_task(ctx.clone(), id, shared.clone(), tx));
            (handle, rx)
        })
        .unzip()
}

/// Spawns one accumulator per worker channel, all folding into `total`.
pub fn spawn_accumulators(
    ctx: &ExecutionContext,
    channels: Vec<Receiver<Triple>>,
    total: &RunningTotal,
) -> Vec<JoinHandle<()>> {
    channels
        .into_iter()
        .enumerate()
        .map(|(id, rx)| tokio::spawn(accumulator_task(ctx.clone(), id, rx, total.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::BoxError;

    #[derive(Clone, Default)]
    struct Recording {
        seen: Arc<std::sync::Mutex<Vec<u64>>>,
    }

    impl Reporter for Recording {
        async fn report(&self, report: &TotalReport) -> Result<(), BoxError> {
            self.seen.lock().unwrap().push(report.total);
            Ok(())
        }
    }

    struct Failing;

    impl Reporter for Failing {
        async fn report(&self, _: &TotalReport) -> Result<(), BoxError> {
            Err("sink unavailable".into())
        }
    }

    #[tokio::test]
    async fn spawn_expected_number_of_workers() {
        let n = 10;
        let (ctx, _shutdown) = ExecutionContext::new();
        let (_tx, rx) = channel(n);
        let (workers, channels) = spawn_workers(&ctx, n, rx);

        assert_eq!(workers.len(), n);
        assert_eq!(channels.len(), n);
    }

    #[tokio::test]
    async fn cancelled_resolves_when_sender_dropped() {
        let (mut ctx, shutdown) = ExecutionContext::new();
        drop(shutdown);
        ctx.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn generator_respects_backpressure() {
        let (ctx, _shutdown) = ExecutionContext::new();
        let (tx, mut rx) = channel(2);
        let generated = Arc::new(AtomicU64::new(0));
        let source = std::iter::repeat_with(|| Batch::from(vec![1, 2, 3]));

        let generator = tokio::spawn(generator_task(
            ctx,
            source,
            tx,
            Duration::ZERO,
            generated.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Nobody is receiving: only the buffer could be filled
        assert_eq!(generated.load(Ordering::Relaxed), 2);

        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(generated.load(Ordering::Relaxed), 3);

        generator.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn generator_waits_between_batches() {
        let (ctx, _shutdown) = ExecutionContext::new();
        let (tx, mut rx) = channel(16);
        let generated = Arc::new(AtomicU64::new(0));
        let source = std::iter::repeat_with(|| Batch::from(vec![0]));

        tokio::spawn(generator_task(
            ctx,
            source,
            tx,
            Duration::from_millis(500),
            generated.clone(),
        ));

        // One batch at t=0, then one every 500ms
        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(generated.load(Ordering::Relaxed), 3);
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
    }

    #[tokio::test]
    async fn generator_closes_channel_when_source_ends() {
        let (ctx, _shutdown) = ExecutionContext::new();
        let (tx, mut rx) = channel(8);
        let generated = Arc::new(AtomicU64::new(0));
        let source = vec![Batch::from(vec![1]), Batch::from(vec![2])].into_iter();

        generator_task(ctx, source, tx, Duration::ZERO, generated.clone()).await;

        assert_eq!(rx.recv().await, Some(Batch::from(vec![1])));
        assert_eq!(rx.recv().await, Some(Batch::from(vec![2])));
        assert_eq!(rx.recv().await, None);
        assert_eq!(generated.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn worker_reduces_and_stops_on_closed_channel() {
        let (ctx, _shutdown) = ExecutionContext::new();
        let (batch_tx, batch_rx) = channel(4);
        let (triple_tx, mut triple_rx) = channel(4);

        batch_tx
            .send(Batch::from(vec![4, 1, 7, 2, 9, 0, 3, 8, 5, 6]))
            .await
            .unwrap();
        drop(batch_tx);

        worker_task(ctx, 0, Arc::new(Mutex::new(batch_rx)), triple_tx).await;

        assert_eq!(triple_rx.recv().await.unwrap().values(), &[7, 8, 9]);
        assert!(triple_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn accumulator_folds_every_triple() {
        let (ctx, _shutdown) = ExecutionContext::new();
        let (tx, rx) = channel(64);
        let total = RunningTotal::new();

        for _ in 0..40 {
            tx.send(Batch::from(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 9]).reduce())
                .await
                .unwrap();
        }
        drop(tx);

        accumulator_task(ctx, 0, rx, total.clone()).await;

        assert_eq!(total.get(), 40 * 9);
        assert_eq!(total.contributions(), 40);
    }

    #[tokio::test]
    async fn tasks_stop_on_shutdown() {
        let (ctx, shutdown) = ExecutionContext::new();
        let (_batch_tx, batch_rx) = channel::<Batch>(1);
        let (workers, channels) = spawn_workers(&ctx, 3, batch_rx);
        let accumulators = spawn_accumulators(&ctx, channels, &RunningTotal::new());

        shutdown.send(true).unwrap();

        for handle in workers.into_iter().chain(accumulators) {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_emits_on_interval() {
        let (ctx, shutdown) = ExecutionContext::new();
        let total = RunningTotal::new();
        let recording = Recording::default();

        let reporter = tokio::spawn(reporter_task(
            ctx,
            recording.clone(),
            total.clone(),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        total.add(24);
        tokio::time::sleep(Duration::from_secs(1)).await;
        total.add(12);
        tokio::time::sleep(Duration::from_secs(1)).await;

        shutdown.send(true).unwrap();
        reporter.await.unwrap();

        assert_eq!(*recording.seen.lock().unwrap(), vec![0, 24, 36]);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_survives_failures() {
        let (ctx, shutdown) = ExecutionContext::new();
        let reporter = tokio::spawn(reporter_task(
            ctx,
            Failing,
            RunningTotal::new(),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!reporter.is_finished());

        shutdown.send(true).unwrap();
        reporter.await.unwrap();
    }
}
