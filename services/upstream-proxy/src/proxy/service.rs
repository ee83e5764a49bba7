//! The proxy context object and per-connection handling.
//!
//! A [`Proxy`] bundles everything a connection task needs: the admission
//! gate, the route table, the connection registry, failure handlers and the
//! backend connector. It is cheap to clone and is passed explicitly to every
//! task that needs it.
//!
//! Each connection moves through a fixed sequence of states:
//!
//! ```text
//! Accepted -> Admitted -> Sniffing -> Routed -> Connecting -> Relaying -> Closed
//! ```
//!
//! Any failing transition produces a [`ConnectionFault`] and goes straight to
//! `Closed`, after writing the fault's fixed response (or handing the
//! frontend to a registered failure handler).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::backend::{BackendTarget, Connector, DEFAULT_CONNECT_TIMEOUT};
use super::callbacks::{Callbacks, Failure};
use super::error::{ConfigError, ConfigWarning, ConnectionFault};
use super::gate::{LifecycleGate, LifecycleState};
use super::registry::{ConnectionInfo, ConnectionRegistry};
use super::relay::{relay, BoxedStream, ProxyStream, RelayEnd, RelayOutcome};
use super::response::{respond, SERVICE_UNAVAILABLE};
use super::router::{RouteSnapshot, RouteTable, RoutingDecision};
use super::snapshot::ProxyConfig;
use super::sniff::{sniff, Protocol};

/// Default upper bound on the first chunk read from a frontend.
pub const DEFAULT_MAX_SNIFF_BYTES: usize = 8192;

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Size of the single read used to sniff the host key.
    pub max_sniff_bytes: usize,
    /// Limit on waiting for the first chunk. Off by default.
    pub sniff_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub initial_state: LifecycleState,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            max_sniff_bytes: DEFAULT_MAX_SNIFF_BYTES,
            sniff_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            initial_state: LifecycleState::Passive,
        }
    }
}

/// Counters for one proxy instance.
#[derive(Debug, Default)]
pub struct ProxyStats {
    pub accepted: AtomicU64,
    pub rejected_passive: AtomicU64,
    pub bad_request: AtomicU64,
    pub no_route: AtomicU64,
    pub misconfigured: AtomicU64,
    pub backend_failed: AtomicU64,
    pub relays_opened: AtomicU64,
    pub relays_closed: AtomicU64,
    pub bytes_to_backend: AtomicU64,
    pub bytes_from_backend: AtomicU64,
}

impl ProxyStats {
    fn record_fault(&self, fault: &ConnectionFault) {
        let counter = match fault {
            ConnectionFault::Passive => &self.rejected_passive,
            ConnectionFault::MalformedInput(_) => &self.bad_request,
            ConnectionFault::NoRoute { .. } | ConnectionFault::HostVanished { .. } => {
                &self.no_route
            }
            ConnectionFault::MisconfiguredRoute { .. } => &self.misconfigured,
            ConnectionFault::BackendUnreachable { .. } => &self.backend_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of applying a configuration snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub route_count: usize,
    pub warnings: Vec<ConfigWarning>,
}

/// Per-connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Admitted,
    Sniffing,
    Routed,
    Connecting,
    Relaying,
    Closed,
}

/// How a connection task finished.
#[derive(Debug)]
pub enum ConnectionEnd {
    /// A fixed status response was written.
    Rejected { status: u16 },
    /// A failure handler took ownership of the frontend.
    HandedOff { status: u16 },
    /// The connection was relayed to a backend.
    Relayed(RelayOutcome),
}

/// A connection ready to relay.
struct Established {
    host_key: String,
    target: BackendTarget,
    backend: BoxedStream,
    first_chunk: Vec<u8>,
}

/// A connection that failed before relaying.
struct Rejection {
    fault: ConnectionFault,
    host_key: Option<String>,
    first_chunk: Vec<u8>,
}

impl From<ConnectionFault> for Rejection {
    fn from(fault: ConnectionFault) -> Self {
        Self {
            fault,
            host_key: None,
            first_chunk: Vec::new(),
        }
    }
}

fn enter(state: &mut ConnectionState, next: ConnectionState) {
    debug!(from = ?*state, to = ?next, "Connection state");
    *state = next;
}

struct ProxyInner {
    options: ProxyOptions,
    gate: LifecycleGate,
    routes: RouteTable,
    registry: ConnectionRegistry,
    config: ArcSwap<ProxyConfig>,
    callbacks: ArcSwap<Callbacks>,
    connector: Connector,
    stats: ProxyStats,
    /// Serialises reconfigurations so registry buckets and the installed
    /// table change together.
    reconfigure: Mutex<()>,
}

#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    /// Create a proxy with an empty route table.
    pub fn new(options: ProxyOptions) -> Self {
        let inner = ProxyInner {
            gate: LifecycleGate::new(options.initial_state),
            routes: RouteTable::new(),
            registry: ConnectionRegistry::new(),
            config: ArcSwap::from_pointee(ProxyConfig::default()),
            callbacks: ArcSwap::from_pointee(Callbacks::default()),
            connector: Connector::with_timeout(options.connect_timeout),
            stats: ProxyStats::default(),
            reconfigure: Mutex::new(()),
            options,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Create a proxy and apply an initial configuration.
    pub fn with_config(options: ProxyOptions, config: ProxyConfig) -> Result<Self, ConfigError> {
        let proxy = Self::new(options);
        proxy.set_config(config)?;
        Ok(proxy)
    }

    pub fn start(&self) -> LifecycleState {
        self.inner.gate.start()
    }

    /// Stop admitting new connections. Established relays keep running.
    pub fn stop(&self) -> LifecycleState {
        self.inner.gate.stop()
    }

    pub fn status(&self) -> LifecycleState {
        self.inner.gate.state()
    }

    /// The active configuration in canonical form.
    pub fn config(&self) -> Arc<ProxyConfig> {
        self.inner.config.load_full()
    }

    /// Validate a snapshot, rebuild the route table and install it.
    ///
    /// On error nothing changes.
    pub fn set_config(&self, config: ProxyConfig) -> Result<ConfigReport, ConfigError> {
        config.validate()?;

        let _guard = self
            .inner
            .reconfigure
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let (snapshot, warnings) = RouteSnapshot::build(&config);
        for warning in &warnings {
            warn!(warning = %warning, "Configuration warning");
        }

        let hosts = snapshot.host_set();
        let route_count = snapshot.len();
        self.inner.registry.ensure_hosts(&hosts);
        self.inner.routes.install(snapshot);
        self.inner.registry.sync_hosts(hosts);
        self.inner.config.store(Arc::new(config));

        info!(
            route_count = route_count,
            warnings = warnings.len(),
            "Configuration applied"
        );

        Ok(ConfigReport {
            route_count,
            warnings,
        })
    }

    /// Parse a JSON snapshot in any accepted shape and apply it.
    pub fn set_config_json(&self, raw: &str) -> Result<ConfigReport, ConfigError> {
        self.set_config(ProxyConfig::from_json(raw)?)
    }

    /// The installed route table.
    pub fn routes(&self) -> Arc<RouteSnapshot> {
        self.inner.routes.snapshot()
    }

    /// Replace all failure handlers.
    pub fn set_callbacks(&self, callbacks: Callbacks) {
        info!(status_codes = ?callbacks.status_codes(), "Failure handlers replaced");
        self.inner.callbacks.store(Arc::new(callbacks));
    }

    pub fn callbacks(&self) -> Arc<Callbacks> {
        self.inner.callbacks.load_full()
    }

    /// Terminate every connection routed under `host_key`.
    pub fn disconnect_clients(&self, host_key: &str) -> usize {
        let count = self.inner.registry.disconnect(host_key);
        info!(host = %host_key, count = count, "Disconnected clients");
        count
    }

    pub fn disconnect_all_clients(&self) -> usize {
        let count = self.inner.registry.disconnect_all();
        info!(count = count, "Disconnected all clients");
        count
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.registry.connections()
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.inner.stats
    }

    pub fn options(&self) -> &ProxyOptions {
        &self.inner.options
    }

    /// Drive one accepted frontend connection to completion.
    pub async fn handle_connection<S>(&self, mut frontend: S) -> ConnectionEnd
    where
        S: ProxyStream + 'static,
    {
        let stats = &self.inner.stats;
        stats.accepted.fetch_add(1, Ordering::Relaxed);

        let mut state = ConnectionState::Accepted;
        let established = match self.establish(&mut frontend, &mut state).await {
            Ok(established) => established,
            Err(rejection) => {
                let end = self.reject(frontend, rejection).await;
                enter(&mut state, ConnectionState::Closed);
                return end;
            }
        };

        let Established {
            host_key,
            target,
            backend,
            first_chunk,
        } = established;

        let id = self.inner.registry.next_id();
        let (terminate, terminated) = oneshot::channel();
        if let Err(fault) = self.inner.registry.register(id, &host_key, terminate) {
            drop(backend);
            let end = self.reject(frontend, fault.into()).await;
            enter(&mut state, ConnectionState::Closed);
            return end;
        }

        enter(&mut state, ConnectionState::Relaying);
        stats.relays_opened.fetch_add(1, Ordering::Relaxed);

        let outcome = relay(frontend, backend, &first_chunk, terminated).await;

        stats.relays_closed.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_to_backend
            .fetch_add(outcome.bytes_to_backend, Ordering::Relaxed);
        stats
            .bytes_from_backend
            .fetch_add(outcome.bytes_from_backend, Ordering::Relaxed);
        self.inner.registry.unregister(id);

        match &outcome.end {
            RelayEnd::Failed(e) => debug!(id, host = %host_key, target = %target, error = %e, "Relay failed"),
            end => debug!(id, host = %host_key, target = %target, end = ?end, "Relay finished"),
        }
        debug!(
            id,
            bytes_to_backend = outcome.bytes_to_backend,
            bytes_from_backend = outcome.bytes_from_backend,
            "Connection closed"
        );

        enter(&mut state, ConnectionState::Closed);
        ConnectionEnd::Relayed(outcome)
    }

    /// Walk the connection from admission to a connected backend.
    async fn establish<S>(
        &self,
        frontend: &mut S,
        state: &mut ConnectionState,
    ) -> Result<Established, Rejection>
    where
        S: ProxyStream,
    {
        if !self.inner.gate.is_active() {
            return Err(ConnectionFault::Passive.into());
        }
        enter(state, ConnectionState::Admitted);

        let first_chunk = self.read_first_chunk(frontend).await?;
        enter(state, ConnectionState::Sniffing);

        let protocol = Protocol::detect(&first_chunk);
        let Some(host) = sniff(&first_chunk) else {
            debug!(protocol = %protocol, "No host key in first chunk");
            return Err(Rejection {
                fault: ConnectionFault::NoRoute { host: None },
                host_key: None,
                first_chunk,
            });
        };
        debug!(protocol = %protocol, host = %host, "Host key extracted");

        let (host_key, route) = match self.inner.routes.route(&host) {
            RoutingDecision::Matched { host_key, route } => (host_key, route),
            RoutingDecision::NoMatch { reason } => {
                debug!(reason = %reason, "No route match");
                return Err(Rejection {
                    fault: ConnectionFault::NoRoute { host: Some(host) },
                    host_key: None,
                    first_chunk,
                });
            }
        };

        let Some(target) = route.target else {
            return Err(Rejection {
                fault: ConnectionFault::MisconfiguredRoute {
                    host: host_key.clone(),
                },
                host_key: Some(host_key),
                first_chunk,
            });
        };
        enter(state, ConnectionState::Routed);

        enter(state, ConnectionState::Connecting);
        match self.inner.connector.connect(&target).await {
            Ok(backend) => {
                debug!(host = %host_key, target = %target, "Connected to backend");
                Ok(Established {
                    host_key,
                    target,
                    backend,
                    first_chunk,
                })
            }
            Err(source) => Err(Rejection {
                fault: ConnectionFault::BackendUnreachable { target, source },
                host_key: Some(host_key),
                first_chunk,
            }),
        }
    }

    /// Read the single chunk used for sniffing.
    async fn read_first_chunk<S>(&self, frontend: &mut S) -> Result<Vec<u8>, ConnectionFault>
    where
        S: ProxyStream,
    {
        let mut buf = vec![0u8; self.inner.options.max_sniff_bytes.max(1)];
        let read = frontend.read(&mut buf);

        let result = match self.inner.options.sniff_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ConnectionFault::MalformedInput(
                        "timed out waiting for first chunk".to_string(),
                    ))
                }
            },
            None => read.await,
        };

        match result {
            Ok(0) => Err(ConnectionFault::MalformedInput(
                "connection closed before sending data".to_string(),
            )),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => Err(ConnectionFault::MalformedInput(e.to_string())),
        }
    }

    /// Answer a failed connection and close it.
    async fn reject<S>(&self, mut frontend: S, rejection: Rejection) -> ConnectionEnd
    where
        S: ProxyStream + 'static,
    {
        let Rejection {
            fault,
            host_key,
            first_chunk,
        } = rejection;
        let status = fault.status();
        self.inner.stats.record_fault(&fault);

        match fault {
            ConnectionFault::BackendUnreachable { target, source } => {
                warn!(host = ?host_key, target = %target, error = %source, "Backend unreachable");

                let handler = self.inner.callbacks.load().get(SERVICE_UNAVAILABLE);
                if let Some(handler) = handler {
                    let failure = Failure {
                        status,
                        host_key: host_key.unwrap_or_default(),
                        target,
                        error: source,
                        first_chunk,
                        frontend: Box::new(frontend),
                    };
                    handler.handle(failure).await;
                    return ConnectionEnd::HandedOff { status };
                }
            }
            ConnectionFault::Passive => debug!("Rejected while passive"),
            fault => debug!(status, error = %fault, "Connection rejected"),
        }

        respond(&mut frontend, status).await;
        ConnectionEnd::Rejected { status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::sni::tests::client_hello;
    use serde_json::json;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn active() -> ProxyOptions {
        ProxyOptions {
            initial_state: LifecycleState::Active,
            ..ProxyOptions::default()
        }
    }

    fn config(value: serde_json::Value) -> ProxyConfig {
        ProxyConfig::from_value(value).unwrap()
    }

    fn tcp_route(host: &str, port: u16) -> ProxyConfig {
        config(json!({
            "frontend_connectors": [{ "host_headers": [host], "target": "web" }],
            "backend_connectors": [
                { "name": "web", "endpoints": { "tcp": { "host": "127.0.0.1", "port": port } } }
            ]
        }))
    }

    fn spawn(proxy: &Proxy) -> (DuplexStream, JoinHandle<ConnectionEnd>) {
        let (client, frontend) = duplex(4096);
        let proxy = proxy.clone();
        let task = tokio::spawn(async move { proxy.handle_connection(frontend).await });
        (client, task)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn exchange(proxy: &Proxy, request: &[u8]) -> (String, ConnectionEnd) {
        let (mut client, task) = spawn(proxy);
        client.write_all(request).await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        (String::from_utf8(response).unwrap(), task.await.unwrap())
    }

    #[test]
    fn test_default_options() {
        let options = ProxyOptions::default();
        assert_eq!(options.max_sniff_bytes, DEFAULT_MAX_SNIFF_BYTES);
        assert_eq!(options.initial_state, LifecycleState::Passive);
        assert!(options.sniff_timeout.is_none());
    }

    #[test]
    fn test_lifecycle_controls() {
        let proxy = Proxy::new(ProxyOptions::default());
        assert_eq!(proxy.status(), LifecycleState::Passive);
        assert_eq!(proxy.start(), LifecycleState::Active);
        assert_eq!(proxy.stop(), LifecycleState::Passive);
        assert_eq!(proxy.stop(), LifecycleState::Passive);
    }

    #[test]
    fn test_set_config_reports_warnings() {
        let proxy = Proxy::new(active());
        let report = proxy
            .set_config(config(json!({
                "frontend_connectors": [
                    { "host_headers": ["a.test", "b.test"], "target": "web" },
                    { "host_headers": ["a.test"], "target": "other" },
                    { "host_headers": ["c.test"], "target": "missing" }
                ],
                "backend_connectors": [
                    { "name": "web", "endpoints": { "ipc": "web.sock" } },
                    { "name": "other", "endpoints": {} }
                ]
            })))
            .unwrap();

        assert_eq!(report.route_count, 2);
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(proxy.routes().hostnames(), vec!["a.test", "b.test"]);
        assert_eq!(proxy.routes().get("a.test").unwrap().backend, "web");
    }

    #[test]
    fn test_invalid_config_keeps_previous() {
        let proxy = Proxy::with_config(active(), tcp_route("a.test", 9001)).unwrap();

        let result = proxy.set_config_json(r#"{ "frontend_connectors": [], "backend_connectors": [
            { "name": "x", "endpoints": { "ipc": "a" } },
            { "name": "x", "endpoints": { "ipc": "b" } }
        ] }"#);
        assert!(matches!(result, Err(ConfigError::DuplicateBackend(_))));
        assert!(proxy.set_config_json("{ not json").is_err());
        assert!(proxy
            .set_config_json(
                r#"{ "frontend_connector": [{ "host_headers": ["a.test"], "target": "web" }] }"#
            )
            .is_err());

        assert_eq!(proxy.routes().hostnames(), vec!["a.test"]);
        assert_eq!(*proxy.config(), tcp_route("a.test", 9001));
    }

    #[tokio::test]
    async fn test_passive_rejects_with_503() {
        let proxy = Proxy::new(ProxyOptions::default());
        let (mut client, task) = spawn(&proxy);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 503 Service Unavailable\r\n\r\n");
        assert!(matches!(
            task.await.unwrap(),
            ConnectionEnd::Rejected { status: 503 }
        ));
        assert_eq!(proxy.stats().rejected_passive.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_empty_connection_gets_400() {
        let proxy = Proxy::new(active());
        let (mut client, task) = spawn(&proxy);
        client.shutdown().await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 400 Bad Request\r\n\r\n");
        assert!(matches!(
            task.await.unwrap(),
            ConnectionEnd::Rejected { status: 400 }
        ));
    }

    #[tokio::test]
    async fn test_sniff_timeout_gets_400() {
        let proxy = Proxy::new(ProxyOptions {
            sniff_timeout: Some(Duration::from_millis(20)),
            ..active()
        });
        let (mut client, task) = spawn(&proxy);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 400 Bad Request\r\n\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_host_gets_404() {
        let proxy = Proxy::with_config(active(), tcp_route("a.test", 9001)).unwrap();
        let (response, end) = exchange(&proxy, b"GET / HTTP/1.1\r\nHost: b.test\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 404 Not Found\r\n\r\n");
        assert!(matches!(end, ConnectionEnd::Rejected { status: 404 }));

        let (response, _) = exchange(&proxy, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 404 Not Found\r\n\r\n");
        assert_eq!(proxy.stats().no_route.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_wildcard_needs_a_host_key() {
        let proxy = Proxy::with_config(active(), tcp_route("*", 9001)).unwrap();
        let (response, _) = exchange(&proxy, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[tokio::test]
    async fn test_route_without_endpoint_gets_502() {
        let proxy = Proxy::with_config(
            active(),
            config(json!({
                "host_headers": { "a.test": "web" },
                "backends": { "web": {} }
            })),
        )
        .unwrap();

        let (response, end) = exchange(&proxy, b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 502 Bad Gateway\r\n\r\n");
        assert!(matches!(end, ConnectionEnd::Rejected { status: 502 }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_gets_503() {
        let port = closed_port().await;
        let proxy = Proxy::with_config(active(), tcp_route("a.test", port)).unwrap();

        let (response, end) = exchange(&proxy, b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 503 Service Unavailable\r\n\r\n");
        assert!(matches!(end, ConnectionEnd::Rejected { status: 503 }));
        assert_eq!(proxy.stats().backend_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_uses_handler() {
        let port = closed_port().await;
        let proxy = Proxy::with_config(active(), tcp_route("a.test", port)).unwrap();
        proxy.set_callbacks(Callbacks::new().with(SERVICE_UNAVAILABLE, |mut f: Failure| async move {
            let line = format!("{} {} {}", f.status, f.host_key, f.first_chunk.len());
            let _ = f.frontend.write_all(line.as_bytes()).await;
            let _ = f.frontend.shutdown().await;
        }));
        assert_eq!(proxy.callbacks().status_codes(), vec![SERVICE_UNAVAILABLE]);

        let request = b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n";
        let (response, end) = exchange(&proxy, request).await;
        assert_eq!(response, format!("503 a.test {}", request.len()));
        assert!(matches!(end, ConnectionEnd::HandedOff { status: 503 }));
    }

    #[tokio::test]
    async fn test_tls_and_plaintext_route_alike() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = backend.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = backend.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap();
                    let reply = format!("got {n}");
                    stream.write_all(reply.as_bytes()).await.unwrap();
                });
            }
        });

        let proxy = Proxy::with_config(active(), tcp_route("example.com", port)).unwrap();

        let plaintext = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (response, end) = exchange(&proxy, plaintext).await;
        assert_eq!(response, format!("got {}", plaintext.len()));
        assert!(matches!(end, ConnectionEnd::Relayed(_)));

        let hello = client_hello("example.com");
        let (response, _) = exchange(&proxy, &hello).await;
        assert_eq!(response, format!("got {}", hello.len()));

        assert_eq!(proxy.stats().relays_closed.load(Ordering::Relaxed), 2);
        assert_eq!(proxy.connection_count(), 0);
    }
}
