use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;

/// Boxed error returned by [`Reporter`]s.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A [`TotalReport`] is one observation of the running total.
///
/// Reports are pure data: no I/O, built straight from the value loaded out of
/// the [`crate::RunningTotal`]. Printing or shipping them somewhere is the job
/// of a [`Reporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TotalReport {
    pub total: u64,
}

impl From<u64> for TotalReport {
    fn from(total: u64) -> Self {
        Self { total }
    }
}

/// A [`Reporter`] consumes [`TotalReport`]s and performs side effects:
/// displaying them, sending them to a service, or persisting them somewhere.
///
/// Reporters are the output boundary of the pipeline. A failing reporter is
/// logged by the reporter task and the loop carries on; errors never stop the
/// pipeline.
///
/// # Example
/// ```rust
/// use sumpipe::{Reporter, TotalReport, report::BoxError};
///
/// struct EprintReporter;
/// impl Reporter for EprintReporter {
///     async fn report(&self, report: &TotalReport) -> Result<(), BoxError> {
///         eprintln!("total so far: {}", report.total);
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter
where
    Self: Send + Sync + 'static,
{
    fn report(&self, report: &TotalReport) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Prints each total as a plain decimal line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    async fn report(&self, report: &TotalReport) -> Result<(), BoxError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", report.total)?;
        Ok(())
    }
}

/// Prints each report as one JSON object per line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    async fn report(&self, report: &TotalReport) -> Result<(), BoxError> {
        let value = serde_json::to_string(report)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{value}")?;
        Ok(())
    }
}

/// Output format selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Plain,
    Json,
}

impl ReportFormat {
    /// Parse a format name, case-insensitively. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "plain" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Reporter dispatching on the configured [`ReportFormat`].
#[derive(Debug, Clone, Copy)]
pub enum ConsoleReporter {
    Plain(StdoutReporter),
    Json(JsonReporter),
}

impl From<ReportFormat> for ConsoleReporter {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Plain => Self::Plain(StdoutReporter),
            ReportFormat::Json => Self::Json(JsonReporter),
        }
    }
}

impl Reporter for ConsoleReporter {
    async fn report(&self, report: &TotalReport) -> Result<(), BoxError> {
        match self {
            Self::Plain(r) => r.report(report).await,
            Self::Json(r) => r.report(report).await,
        }
    }
}
