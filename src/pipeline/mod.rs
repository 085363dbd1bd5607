//! Pipeline: wiring of the generator, workers, accumulators and reporter
//!
//! # High-level flow
//! 1. A shared execution context is created, holding the shutdown signal.
//! 2. A bounded batch channel is created, with room for `channel_capacity`
//!    batches (the worker count unless configured otherwise).
//! 3. The generator task is spawned. It publishes one batch per
//!    `generation_interval` and blocks while the channel is full.
//! 4. N worker tasks are spawned, all receiving from the same channel. Each
//!    reduces its batch to a [`crate::Triple`] and sends it on a private
//!    channel.
//! 5. One accumulator per worker drains that private channel and adds each
//!    triple's sum to the shared [`RunningTotal`].
//! 6. The reporter task loads the total once per `report_interval` and hands
//!    it to a [`Reporter`].
//!
//! ```text
//!                      ┌──────────┐   ┌──────────────┐
//!                  ┌──▶│ worker 0 │──▶│ accumulator 0│──┐
//! ┌───────────┐    │   └──────────┘   └──────────────┘  │   ┌──────────────┐   ┌──────────┐
//! │ generator │────┤         ...              ...       ├──▶│ RunningTotal │──▶│ reporter │
//! └───────────┘    │   ┌──────────┐   ┌──────────────┐  │   └──────────────┘   └──────────┘
//!                  └──▶│ worker N │──▶│ accumulator N│──┘
//!                      └──────────┘   └──────────────┘
//! ```
//!
//! # Lifecycle
//! A pipeline fed by the endless random source runs until
//! [`PipelineHandle::shutdown`] is called or the handle is dropped. Use
//! [`PipelineHandle::detach`] to keep it running without holding the handle.
//! A finite
//! source ends on its own: the generator closes the batch channel, workers
//! drain it, accumulators drain their channels, and
//! [`PipelineHandle::join`] returns once every batch has been folded.
//!
//! # Notes about correctness
//! - Each batch is received by exactly one worker and each triple is added
//!   exactly once, so the final total does not depend on the worker count or
//!   on scheduling. Only its timing does.
//! - Batches still queued when shutdown is signalled are dropped.
//! - Panics inside a task are logged when the handle joins it; the remaining
//!   tasks keep their results.
mod internals;

#[cfg(feature = "internals")]
pub use internals::*;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;

use crate::{
    Batch, PipelineConfig, Reporter, RunningTotal,
    batch::RandomBatches,
    report::ConsoleReporter,
};
use internals::{ExecutionContext, generator_task, reporter_task, spawn_accumulators, spawn_workers};

/// Start the default pipeline: random batches, console reporting as set by
/// `config.report_format`.
///
/// Must be called from within a tokio runtime. The pipeline stops as soon as
/// the returned handle is dropped; call [`PipelineHandle::detach`] to run it
/// without keeping the handle around.
#[must_use = "dropping the handle stops the pipeline"]
pub fn start(config: PipelineConfig) -> PipelineHandle {
    let source = match config.seed {
        Some(seed) => RandomBatches::seeded(seed),
        None => RandomBatches::from_clock(),
    };
    let reporter = ConsoleReporter::from(config.report_format);

    Pipeline::builder()
        .config(config)
        .source(source)
        .reporter(reporter)
        .build()
        .start()
}

/// A fully configured pipeline, ready to be started.
///
/// ```rust
/// use std::time::Duration;
/// use sumpipe::{Batch, Pipeline, PipelineConfig, StdoutReporter};
///
/// #[tokio::main]
/// async fn main() {
///     let batches = vec![
///         Batch::from(vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1]),
///         Batch::from(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 9]),
///     ];
///     let summary = Pipeline::builder()
///         .config(
///             PipelineConfig::builder()
///                 .generation_interval(Duration::ZERO)
///                 .build(),
///         )
///         .source(batches.into_iter())
///         .reporter(StdoutReporter)
///         .build()
///         .start()
///         .join()
///         .await;
///
///     assert_eq!(summary.total, 12);
/// }
/// ```
#[derive(TypedBuilder)]
pub struct Pipeline<S, R>
where
    S: Iterator<Item = Batch> + Send + 'static,
    R: Reporter,
{
    pub config: PipelineConfig,
    /// Where batches come from. The pipeline drains once it is exhausted.
    pub source: S,
    pub reporter: R,
    /// Total to fold into. Pass one in to observe it from elsewhere.
    #[builder(default)]
    pub total: RunningTotal,
}

impl<S, R> Pipeline<S, R>
where
    S: Iterator<Item = Batch> + Send + 'static,
    R: Reporter,
{
    /// Spawn every task and return the handle controlling them.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle stops the pipeline.
    #[must_use = "dropping the handle stops the pipeline"]
    pub fn start(self) -> PipelineHandle {
        let Self {
            config,
            source,
            reporter,
            total,
        } = self;

        let (ctx, shutdown_tx) = ExecutionContext::new();
        let (batch_tx, batch_rx) = mpsc::channel(config.channel_capacity());
        let generated = Arc::new(AtomicU64::new(0));

        tracing::info!("Spawning generator task...");
        let generator = tokio::spawn(generator_task(
            ctx.clone(),
            source,
            batch_tx,
            config.generation_interval,
            generated.clone(),
        ));

        tracing::info!("Spawning {} workers...", config.workers);
        let (workers, channels) = spawn_workers(&ctx, config.workers, batch_rx);
        let accumulators = spawn_accumulators(&ctx, channels, &total);

        tracing::info!("Spawning reporter task...");
        let reporter = tokio::spawn(reporter_task(
            ctx,
            reporter,
            total.clone(),
            config.report_interval,
        ));

        tracing::info!("Pipeline running!");
        let mut producers = Vec::with_capacity(1 + 2 * config.workers);
        producers.push(generator);
        producers.extend(workers);
        producers.extend(accumulators);

        PipelineHandle {
            total,
            generated,
            shutdown_tx,
            producers,
            reporter,
        }
    }
}

/// Handle to a running pipeline.
///
/// Dropping the handle signals shutdown to every task, exactly like
/// [`PipelineHandle::shutdown`] without waiting for them.
#[must_use = "dropping the handle stops the pipeline"]
pub struct PipelineHandle {
    total: RunningTotal,
    generated: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    /// Generator, workers and accumulators.
    producers: Vec<JoinHandle<()>>,
    reporter: JoinHandle<()>,
}

/// Final figures of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub total: u64,
    pub batches_generated: u64,
    pub triples_folded: u64,
}

impl PipelineHandle {
    /// The running total the pipeline folds into.
    pub fn total(&self) -> &RunningTotal {
        &self.total
    }

    /// Number of batches the generator has published so far.
    pub fn batches_generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// Signal shutdown and wait for every task to stop.
    pub async fn shutdown(self) -> PipelineSummary {
        tracing::info!("Signaling shutdown...");
        // No receiver left means every task already stopped
        let _ = self.shutdown_tx.send(true);
        self.finish().await
    }

    /// Wait until the source is exhausted and every batch has been folded,
    /// then stop the reporter.
    ///
    /// Never returns for an endless source, see [`PipelineHandle::shutdown`].
    pub async fn join(mut self) -> PipelineSummary {
        tracing::info!("Waiting for the pipeline to drain...");
        join_tasks(std::mem::take(&mut self.producers)).await;
        tracing::info!("Pipeline drained, stopping reporter...");
        let _ = self.shutdown_tx.send(true);
        self.finish().await
    }

    /// Let the pipeline run in the background, independent of this handle.
    ///
    /// The returned task behaves like [`PipelineHandle::join`]: it resolves
    /// once a finite source has drained and never for an endless one. It can
    /// be dropped without affecting the pipeline.
    pub fn detach(self) -> JoinHandle<PipelineSummary> {
        tracing::info!("Detaching pipeline...");
        tokio::spawn(self.join())
    }

    async fn finish(self) -> PipelineSummary {
        let mut tasks = self.producers;
        tasks.push(self.reporter);
        join_tasks(tasks).await;

        let summary = PipelineSummary {
            total: self.total.get(),
            batches_generated: self.generated.load(Ordering::Relaxed),
            triples_folded: self.total.contributions(),
        };
        tracing::info!("Pipeline stopped: {summary:?}");
        summary
    }
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for res in join_all(tasks).await {
        if let Err(e) = res {
            tracing::error!("Pipeline task panicked with error: {e}");
        }
    }
}
