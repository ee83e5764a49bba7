//! Routing configuration file watcher.
//!
//! Polls the configuration file and applies it whenever its content changes.
//! On Unix a `SIGHUP` forces an immediate reload. A file that is missing,
//! unreadable or invalid is logged and the installed route table is kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::proxy::{ConfigReport, Proxy};

pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    /// Content of the last file read, applied or not.
    last_seen: Option<String>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_seen: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and apply it if it changed since the last poll.
    ///
    /// Returns `Ok(None)` when the content is unchanged and `force` is false.
    /// A rejected snapshot is still remembered, so the same broken content
    /// is reported once rather than on every poll.
    pub fn poll(&mut self, proxy: &Proxy, force: bool) -> Result<Option<ConfigReport>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;

        if !force && self.last_seen.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }
        self.last_seen = Some(content.clone());

        let report = proxy
            .set_config_json(&content)
            .with_context(|| format!("Failed to apply config file: {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            route_count = report.route_count,
            warnings = report.warnings.len(),
            "Config file applied"
        );
        Ok(Some(report))
    }

    /// Poll forever.
    pub async fn run(mut self, proxy: Proxy) -> Result<()> {
        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Watching config file"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        #[cfg(unix)]
        let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("Failed to install SIGHUP handler")?;

        loop {
            #[cfg(unix)]
            let force = tokio::select! {
                _ = ticker.tick() => false,
                _ = hangup.recv() => {
                    info!("SIGHUP received, reloading config file");
                    true
                }
            };

            #[cfg(not(unix))]
            let force = {
                ticker.tick().await;
                false
            };

            match self.poll(&proxy, force) {
                Ok(Some(_)) => {}
                Ok(None) => debug!("Config file unchanged"),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Config reload failed; keeping previous routes")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{LifecycleState, ProxyOptions};

    const ONE_ROUTE: &str = r#"{ "host_headers": { "a.test": "web" },
        "backends": { "web": { "tcp": { "host": "127.0.0.1", "port": 9001 } } } }"#;
    const TWO_ROUTES: &str = r#"{ "host_headers": { "a.test": "web", "b.test": "web" },
        "backends": { "web": { "tcp": { "host": "127.0.0.1", "port": 9001 } } } }"#;

    fn proxy() -> Proxy {
        Proxy::new(ProxyOptions {
            initial_state: LifecycleState::Active,
            ..ProxyOptions::default()
        })
    }

    #[test]
    fn test_poll_applies_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, ONE_ROUTE).unwrap();

        let proxy = proxy();
        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(50));

        let report = watcher.poll(&proxy, false).unwrap().unwrap();
        assert_eq!(report.route_count, 1);
        assert!(watcher.poll(&proxy, false).unwrap().is_none());

        fs::write(&path, TWO_ROUTES).unwrap();
        let report = watcher.poll(&proxy, false).unwrap().unwrap();
        assert_eq!(report.route_count, 2);
        assert_eq!(proxy.routes().hostnames(), vec!["a.test", "b.test"]);

        assert!(watcher.poll(&proxy, true).unwrap().is_some());
    }

    #[test]
    fn test_invalid_file_keeps_routes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, ONE_ROUTE).unwrap();

        let proxy = proxy();
        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(50));
        watcher.poll(&proxy, false).unwrap();

        fs::write(&path, "{ truncated").unwrap();
        assert!(watcher.poll(&proxy, false).is_err());
        assert!(watcher.poll(&proxy, false).unwrap().is_none());

        fs::write(&path, r#"{ "host_header": { "a.test": "web" } }"#).unwrap();
        assert!(watcher.poll(&proxy, false).is_err());
        assert_eq!(proxy.routes().hostnames(), vec!["a.test"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = ConfigWatcher::new(dir.path().join("absent.json"), Duration::from_secs(1));
        assert!(watcher.poll(&proxy(), false).is_err());
    }

    #[tokio::test]
    async fn test_run_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, ONE_ROUTE).unwrap();

        let proxy = proxy();
        let watcher = ConfigWatcher::new(&path, Duration::from_millis(20));
        let task = tokio::spawn(watcher.run(proxy.clone()));

        fs::write(&path, TWO_ROUTES).unwrap();
        let mut routed = 0;
        for _ in 0..100 {
            routed = proxy.routes().len();
            if routed == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(routed, 2);
        task.abort();
    }
}
