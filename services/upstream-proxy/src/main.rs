//! upstream-proxy
//!
//! Transport-level routing proxy.
//!
//! This service:
//! - Accepts TCP connections on one frontend address
//! - Routes each connection by its HTTP `Host` header or TLS SNI
//! - Forwards to TCP or local IPC backends without terminating TLS
//! - Reloads its routing table from a JSON file on change or SIGHUP

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use upstream_proxy::{ConfigWatcher, Listener, ListenerConfig, Proxy};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to UPSTREAM_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting upstream-proxy");
    info!(
        listen_addr = %config.listen_addr,
        config_file = %config.config_file.display(),
        reload_interval_ms = config.reload_interval.as_millis() as u64,
        start_passive = config.start_passive,
        "Configuration loaded"
    );

    let proxy = Proxy::new(config.proxy_options());

    let mut watcher = ConfigWatcher::new(&config.config_file, config.reload_interval);
    if let Err(e) = watcher.poll(&proxy, true) {
        warn!(error = %format!("{e:#}"), "Initial config not applied; starting with no routes");
    }

    if !config.start_passive {
        proxy.start();
    }

    let listener = Listener::bind(ListenerConfig::new(config.listen_addr), proxy.clone())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let listener = Arc::new(listener);
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!(error = %e, "Listener error");
        }
    });

    let watcher_proxy = proxy.clone();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(watcher_proxy).await {
            error!(error = %format!("{e:#}"), "Config watcher failed");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    proxy.stop();
    let disconnected = proxy.disconnect_all_clients();
    info!(disconnected, "Shutdown complete");

    listener_handle.abort();
    watcher_handle.abort();
    Ok(())
}
