//! Storefront - per-tenant store provisioning service

use clap::Parser;
use tokio_util::sync::CancellationToken;

use storefront::config::{Cli, Config};
use storefront::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::try_from(cli)?;

    init_telemetry(config.log_format)?;

    tracing::info!(
        listen = %config.listen,
        chart = %config.helm.chart,
        release_namespace = %config.helm.release_namespace,
        "starting storefront"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        signal.cancel();
    });

    storefront::run(config, shutdown).await
}
