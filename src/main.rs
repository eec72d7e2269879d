//! Tickwatch - equity screening and portfolio trigger monitoring service.

use anyhow::Result;
use tickwatch::config::Config;
use tickwatch::logging::init_logging;
use tickwatch::WatchService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("tickwatch v{}", env!("CARGO_PKG_VERSION"));

    // Start the service
    let service = WatchService::new(config)?;
    service.start().await
}
