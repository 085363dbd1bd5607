//! sumpipe: a small concurrent pipeline that keeps a running total.
//!
//! A generator emits fixed-size batches of random integers at a fixed
//! interval. A pool of workers shares the generator's channel, and each worker
//! reduces the batches it takes to their three largest values. One accumulator
//! per worker folds those values into a shared running total with an atomic
//! add, and a reporter prints the total at its own interval.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Batch`]: the unit of work, created by the generator and owned by exactly
//!   one worker at a time.
//! - [`Triple`]: the reduced form of a batch, handed from a worker to its
//!   accumulator.
//! - [`RunningTotal`]: the only shared mutable state, an explicitly owned
//!   handle around an atomic counter.
//! - [`TotalReport`] and [`Reporter`]: the output boundary. A report is a pure
//!   snapshot value, a reporter prints or ships it.
//! - [`Pipeline`]: glue that wires a batch source, the workers, the
//!   accumulators and a reporter together, configured by a [`PipelineConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sumpipe::PipelineConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = sumpipe::start(PipelineConfig::default());
//!     tokio::signal::ctrl_c().await.unwrap();
//!     let summary = handle.shutdown().await;
//!     println!("{summary:?}");
//! }
//! ```
//!
//! # Feature flags
//! - `internals`: exposes the task bodies and the execution context the
//!   pipeline is built from (unstable).

/// Batches and the random batch source
pub mod batch;
/// Startup configuration
pub mod config;
/// Generator, workers, accumulators and reporter wiring
pub mod pipeline;
/// Reports and Reporters
pub mod report;
/// The shared running total
pub mod total;
/// Top-three reduction
pub mod triple;

pub use batch::{Batch, RandomBatches};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineHandle, PipelineSummary, start};
pub use report::{JsonReporter, Reporter, StdoutReporter, TotalReport};
pub use total::RunningTotal;
pub use triple::Triple;
