use sumpipe::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout only carries the totals
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = PipelineConfig::from_env()?;

    tracing::info!(
        "PACKAGE_GENERATION_TIMEOUT = {} PRINT_TIMEOUT = {} WORKER_COUNT = {}",
        config.generation_interval.as_millis(),
        config.report_interval.as_secs(),
        config.workers,
    );

    let handle = sumpipe::start(config);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C, stopping now: {e}");
    }

    let summary = handle.shutdown().await;
    tracing::info!(
        "Final total {} from {} batches",
        summary.total,
        summary.batches_generated
    );
    Ok(())
}
