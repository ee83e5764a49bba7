//! Backend targets and the backend connector.
//!
//! A backend connector descriptor may carry a TCP endpoint, an IPC endpoint,
//! or both. It resolves to exactly one [`BackendTarget`], preferring IPC.
//! IPC names are placed in the platform's local-socket namespace:
//! `/tmp/<name>` for Unix domain sockets and `\\.\pipe\<name>` for Windows
//! named pipes. Paths already inside the namespace are left alone.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::relay::BoxedStream;
use super::snapshot::Endpoints;

/// Default connect timeout for backend connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Namespace prefix for local IPC endpoints.
#[cfg(not(windows))]
pub const IPC_PREFIX: &str = "/tmp/";
#[cfg(windows)]
pub const IPC_PREFIX: &str = r"\\.\pipe\";

/// Where a routed connection is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendTarget {
    Tcp { host: String, port: u16 },
    Ipc { path: String },
}

impl BackendTarget {
    /// Resolve a descriptor to a single target. Returns `None` when the
    /// descriptor has neither endpoint.
    pub fn resolve(endpoints: &Endpoints) -> Option<Self> {
        if let Some(ipc) = &endpoints.ipc {
            return Some(BackendTarget::Ipc {
                path: normalize_ipc_path(ipc),
            });
        }

        endpoints.tcp.as_ref().map(|tcp| BackendTarget::Tcp {
            host: tcp.host.clone(),
            port: tcp.port,
        })
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTarget::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{host}]:{port}")
            }
            BackendTarget::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            BackendTarget::Ipc { path } => write!(f, "ipc://{path}"),
        }
    }
}

/// Place an IPC name in the platform's local-socket namespace.
pub fn normalize_ipc_path(name: &str) -> String {
    if in_ipc_namespace(name) {
        name.to_string()
    } else {
        format!("{IPC_PREFIX}{name}")
    }
}

#[cfg(not(windows))]
fn in_ipc_namespace(name: &str) -> bool {
    name.starts_with('/')
}

#[cfg(windows)]
fn in_ipc_namespace(name: &str) -> bool {
    name.starts_with(r"\\.\pipe\") || name.starts_with("//./pipe/")
}

/// Opens outbound connections to backend targets.
///
/// Each call is a single attempt. Retry policy belongs to whoever handles
/// the failure.
#[derive(Debug, Clone)]
pub struct Connector {
    connect_timeout: Duration,
}

impl Connector {
    /// Create a connector with the default timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a connector with a custom connect timeout.
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Attempt to connect to a target.
    pub async fn connect(&self, target: &BackendTarget) -> io::Result<BoxedStream> {
        debug!(target = %target, "Connecting to backend");

        match timeout(self.connect_timeout, open(target)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timeout",
            )),
        }
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

async fn open(target: &BackendTarget) -> io::Result<BoxedStream> {
    match target {
        BackendTarget::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            Ok(Box::new(stream))
        }
        BackendTarget::Ipc { path } => open_ipc(path).await,
    }
}

#[cfg(unix)]
async fn open_ipc(path: &str) -> io::Result<BoxedStream> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open_ipc(path: &str) -> io::Result<BoxedStream> {
    let client = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(client))
}

#[cfg(not(any(unix, windows)))]
async fn open_ipc(path: &str) -> io::Result<BoxedStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("IPC endpoints are not supported on this platform: {path}"),
    ))
}
