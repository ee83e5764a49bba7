//! Host-routing L4 proxy.
//!
//! This module provides:
//! - Host key sniffing (HTTP `Host` header or TLS SNI) from the first chunk
//! - A hot-swappable route table built from configuration snapshots
//! - TCP and local IPC backend connections
//! - A registry of relaying connections for host-scoped disconnects
//! - An admission gate and failure handlers
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Gate -> Sniffer -> Route Table -> Connector -> Backend
//!                                                            |
//!                                              Registry <- Relay
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use upstream_proxy::proxy::{Listener, ListenerConfig, Proxy, ProxyOptions};
//!
//! let proxy = Proxy::new(ProxyOptions::default());
//! proxy.set_config_json(&std::fs::read_to_string("config.json")?)?;
//! proxy.start();
//!
//! let config = ListenerConfig::new("0.0.0.0:3000".parse()?);
//! let listener = Arc::new(Listener::bind(config, proxy.clone()).await?);
//! listener.run().await?;
//! ```

mod backend;
mod callbacks;
mod error;
mod gate;
mod listener;
mod registry;
mod relay;
mod response;
mod router;
mod service;
mod snapshot;
mod sni;
mod sniff;

pub use backend::{
    normalize_ipc_path, BackendTarget, Connector, DEFAULT_CONNECT_TIMEOUT, IPC_PREFIX,
};
pub use callbacks::{Callbacks, Failure, FailureHandler};
pub use error::{ConfigError, ConfigWarning, ConnectionFault};
pub use gate::{LifecycleGate, LifecycleState};
pub use listener::{Listener, ListenerConfig};
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, TerminationHandle};
pub use relay::{relay, BoxedStream, ProxyStream, RelayEnd, RelayOutcome};
pub use response::{
    reason_phrase, respond, status_line, BAD_GATEWAY, BAD_REQUEST, INTERNAL_SERVER_ERROR,
    NOT_FOUND, SERVICE_UNAVAILABLE,
};
pub use router::{Route, RouteSnapshot, RouteTable, RoutingDecision, WILDCARD_HOST};
pub use service::{
    ConfigReport, ConnectionEnd, ConnectionState, Proxy, ProxyOptions, ProxyStats,
    DEFAULT_MAX_SNIFF_BYTES,
};
pub use snapshot::{BackendConnector, Endpoints, FrontendConnector, ProxyConfig, TcpEndpoint};
pub use sni::{parse_sni, SniResult};
pub use sniff::{host_header, sniff, Protocol};
