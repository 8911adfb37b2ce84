//! Price Index - HTTP service
//!
//! Streams top-of-book data from the configured venues and serves the
//! cross-venue mid price of every tracked pair.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use price_index::{api, Config, PriceIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Price Index");

    let config = Config::load()?;
    info!(pairs = ?config.default_pairs, venues = ?config.venues.enabled(), "Configuration loaded");

    let addr: SocketAddr = config.http_addr.parse()?;
    let index = Arc::new(PriceIndex::from_config(config)?);
    index.start().await;

    let app = api::create_router(index.clone());
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    index.shutdown();
    info!("Price Index stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
