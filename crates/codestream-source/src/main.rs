mod config;
mod filter;
mod server;
mod tracker;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use codestream_core::DEFAULT_MAX_PAYLOAD_BYTES;
use filter::PathFilter;
use server::SourceState;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracker::FileTracker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config(config::Args::parse())?;
    init_logging(&config.log_level);

    let mut filter = PathFilter::new(config.skip.iter().cloned());
    if let Err(err) = filter.reload(&config.root) {
        warn!(event = "gitignore_error", error = %err);
    }
    let mut tracker = FileTracker::default();
    for (rel, content) in watcher::scan_folder(&config.root, &filter) {
        tracker.seed(rel, content);
    }
    info!(event = "initial_scan", root = %config.root.display(), files = tracker.len());

    let state = Arc::new(SourceState::new(tracker, DEFAULT_MAX_PAYLOAD_BYTES));
    let watch_state = state.clone();
    let root = config.root.clone();
    let debounce = config.debounce;
    tokio::spawn(async move {
        if let Err(err) = watcher::watch_folder(root, filter, watch_state, debounce).await {
            error!(event = "watch_error", error = %err);
        }
    });

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!(event = "source_start", addr = %config.addr, root = %config.root.display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(
        listener,
        server::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("serve")?;
    info!(event = "source_stop", clients = state.client_count().await);
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
