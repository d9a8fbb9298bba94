//! SnapKV server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

use skv_server::{serve, spawn_purger, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,skv_server=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = ServerConfig::parse();
    let store = Arc::new(config.build_store());

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, "listening");

    let purger = spawn_purger(store.clone(), config.purge_interval());

    tokio::select! {
        result = serve(listener, store) => result.context("accept loop failed")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("received Ctrl+C, shutting down"),
    }

    purger.abort();
    Ok(())
}
