//! Startup configuration of the pipeline.
//!
//! Settings are plain integers read from the environment after loading a
//! `.env` file:
//!
//! | Variable                     | Meaning                         | Default        |
//! |------------------------------|---------------------------------|----------------|
//! | `PACKAGE_GENERATION_TIMEOUT` | generation interval (ms)        | 500            |
//! | `PRINT_TIMEOUT`              | report interval (s)             | 1              |
//! | `WORKER_COUNT`               | number of workers               | 5              |
//! | `CHANNEL_CAPACITY`           | shared channel buffer           | worker count   |
//! | `SEED`                       | fixed RNG seed                  | wall clock     |
//! | `REPORT_FORMAT`              | `plain` or `json`               | `plain`        |
//!
//! A missing, non-numeric or out-of-range value falls back to its default.
//! Only a missing `.env` file is an error.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use typed_builder::TypedBuilder;

use crate::report::ReportFormat;

pub const GENERATION_INTERVAL_VAR: &str = "PACKAGE_GENERATION_TIMEOUT";
pub const REPORT_INTERVAL_VAR: &str = "PRINT_TIMEOUT";
pub const WORKER_COUNT_VAR: &str = "WORKER_COUNT";
pub const CHANNEL_CAPACITY_VAR: &str = "CHANNEL_CAPACITY";
pub const SEED_VAR: &str = "SEED";
pub const REPORT_FORMAT_VAR: &str = "REPORT_FORMAT";

pub const DEFAULT_GENERATION_INTERVAL_MS: u64 = 500;
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Upper bound on `WORKER_COUNT`. Each worker costs two tasks and a channel.
pub const MAX_WORKER_COUNT: usize = 1024;

/// Configuration of a [`crate::Pipeline`], fixed once the pipeline starts.
///
/// # Tuning knobs
/// - `generation_interval`: pause between two batches. Zero means the
///   generator is only throttled by backpressure.
/// - `report_interval`: pause between two reports. Must be non-zero.
/// - `workers`: number of worker tasks, each with its own accumulator.
/// - `channel_capacity`: how many batches the generator may publish ahead of
///   the workers before it blocks. Defaults to `workers`.
/// - `seed`: fixed seed for the batch generator, for reproducible runs.
///
/// ```rust
/// use std::time::Duration;
/// use sumpipe::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .workers(8)
///     .generation_interval(Duration::from_millis(50))
///     .build();
/// assert_eq!(config.channel_capacity(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct PipelineConfig {
    #[builder(default = Duration::from_millis(DEFAULT_GENERATION_INTERVAL_MS))]
    pub generation_interval: Duration,
    #[builder(default = Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS))]
    pub report_interval: Duration,
    #[builder(default = DEFAULT_WORKER_COUNT)]
    pub workers: usize,
    #[builder(default, setter(strip_option))]
    pub channel_buffer: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
    #[builder(default)]
    pub report_format: ReportFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PipelineConfig {
    /// Load `.env` from the working directory, then resolve every setting
    /// from the environment.
    ///
    /// Fails only when no `.env` file can be found.
    pub fn from_env() -> Result<Self> {
        Self::from_env_file(".env")
    }

    /// Load the env file at `path`, then resolve every setting from the
    /// environment. Variables already set in the process take precedence.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::from_path(path).context("No .env file found")?;
        tracing::debug!("Loaded environment from {}", path.display());
        Ok(Self::from_lookup(|name| std::env::var(name).ok()))
    }

    /// Resolve every setting through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let generation_ms = read_setting(&lookup, GENERATION_INTERVAL_VAR, |_: &u64| true)
            .unwrap_or(DEFAULT_GENERATION_INTERVAL_MS);
        let report_secs = read_setting(&lookup, REPORT_INTERVAL_VAR, |s: &u64| *s >= 1)
            .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS);
        let workers = read_setting(&lookup, WORKER_COUNT_VAR, |w: &usize| {
            (1..=MAX_WORKER_COUNT).contains(w)
        })
        .unwrap_or(DEFAULT_WORKER_COUNT);
        let channel_buffer = read_setting(&lookup, CHANNEL_CAPACITY_VAR, |c: &usize| *c >= 1);
        let seed = read_setting(&lookup, SEED_VAR, |_: &u64| true);

        let report_format = match lookup(REPORT_FORMAT_VAR) {
            Some(raw) => ReportFormat::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring {REPORT_FORMAT_VAR}={raw:?}, using the default");
                ReportFormat::default()
            }),
            None => ReportFormat::default(),
        };

        Self {
            generation_interval: Duration::from_millis(generation_ms),
            report_interval: Duration::from_secs(report_secs),
            workers,
            channel_buffer,
            seed,
            report_format,
        }
    }

    /// Capacity of the shared batch channel.
    pub fn channel_capacity(&self) -> usize {
        self.channel_buffer.unwrap_or(self.workers).max(1)
    }
}

/// Read and validate one numeric setting. `None` means "use the default".
fn read_setting<F, T, V>(lookup: &F, name: &str, valid: V) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
    V: Fn(&T) -> bool,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Some(value),
        Ok(value) => {
            tracing::warn!("{name}={value} is out of range, using the default");
            None
        }
        // Non-numeric values fall back silently
        Err(_) => None,
    }
}
