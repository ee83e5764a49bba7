//! Process configuration.
//!
//! Routing itself comes from the JSON config file; this covers how the
//! process listens, reloads and logs.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use upstream_proxy::{LifecycleState, ProxyOptions};

/// Proxy process configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend bind address.
    pub listen_addr: SocketAddr,

    /// Routing configuration file (JSON snapshot).
    pub config_file: PathBuf,

    /// How often the config file is checked for changes.
    pub reload_interval: Duration,

    /// Backend connect timeout.
    pub connect_timeout: Duration,

    /// Optional limit on waiting for a client's first bytes.
    pub sniff_timeout: Option<Duration>,

    /// Size of the first read used to find the host key.
    pub max_sniff_bytes: usize,

    /// Keep the gate passive after startup.
    pub start_passive: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("UPSTREAM_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("UPSTREAM_LISTEN_ADDR must be a socket address (example: 0.0.0.0:3000).")?;

        let config_file = std::env::var("UPSTREAM_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./config.json"));

        let reload_interval_ms = env_u64("UPSTREAM_RELOAD_INTERVAL_MS")?.unwrap_or(1000);
        let reload_interval = Duration::from_millis(reload_interval_ms.max(50));

        let connect_timeout =
            Duration::from_millis(env_u64("UPSTREAM_CONNECT_TIMEOUT_MS")?.unwrap_or(2000));

        let sniff_timeout = env_u64("UPSTREAM_SNIFF_TIMEOUT_MS")?.map(Duration::from_millis);

        let max_sniff_bytes = env_u64("UPSTREAM_MAX_SNIFF_BYTES")?
            .unwrap_or(8192)
            .clamp(1, 1 << 20) as usize;

        let start_passive = std::env::var("UPSTREAM_START_PASSIVE")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let log_level = std::env::var("UPSTREAM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            config_file,
            reload_interval,
            connect_timeout,
            sniff_timeout,
            max_sniff_bytes,
            start_passive,
            log_level,
        })
    }

    /// Options for the proxy instance. The gate always starts passive; the
    /// binary opens it once the initial config has been applied.
    pub fn proxy_options(&self) -> ProxyOptions {
        ProxyOptions {
            max_sniff_bytes: self.max_sniff_bytes,
            sniff_timeout: self.sniff_timeout,
            connect_timeout: self.connect_timeout,
            initial_state: LifecycleState::Passive,
        }
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    std::env::var(name)
        .ok()
        .map(|v| v.parse::<u64>())
        .transpose()
        .with_context(|| format!("{name} must be an integer."))
}
