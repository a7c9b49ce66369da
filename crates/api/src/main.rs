//! Battery SoH Pipeline - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.server.log_level, config.server.json_logs)?;

    info!("=== Battery SoH Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Estimator: {} {:?} (timeout {}ms), ledger: {:?}",
        config.pipeline.estimator.program,
        config.pipeline.estimator.args,
        config.pipeline.estimator.timeout_ms,
        config.pipeline.ledger.backend
    );

    run_server(config).await
}
