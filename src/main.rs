// Fraud analysis service. Clusters credit-card transactions with K-Means and reports
// how concentrated fraud is in each cluster, served over a single HTTP endpoint.
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use kmeans::ClusterAnalyzer;

mod config;
mod csv_reader;
mod error;
mod kmeans;
mod metrics;
mod server;
//end-to-end tests over fixture archives
#[cfg(test)]
mod tests;

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt().with_env_filter(filter).with_target(true).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.verbose);

    if !config.archive.exists() {
        warn!(
            archive = %config.archive.display(),
            "archive not found; requests will fail until it is in place"
        );
    }

    let analyzer = Arc::new(ClusterAnalyzer::new(config.archive.clone()));
    let archive = analyzer.archive_path().display().to_string();
    let app = server::router(analyzer);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %config.bind, %archive, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
