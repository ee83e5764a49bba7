//! Error types for configuration rebuilds and per-connection failures.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use super::backend::BackendTarget;
use super::response::{BAD_GATEWAY, BAD_REQUEST, NOT_FOUND, SERVICE_UNAVAILABLE};

/// A configuration snapshot that could not be applied.
///
/// When one of these is returned the previously installed route table stays
/// active.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The snapshot is not valid JSON or matches none of the accepted shapes.
    #[error("invalid configuration snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two backend connectors share a name.
    #[error("duplicate backend connector name: {0}")]
    DuplicateBackend(String),

    /// A backend connector has an empty name.
    #[error("backend connector name cannot be empty")]
    EmptyBackendName,

    /// A frontend connector lists an empty hostname.
    #[error("empty hostname in frontend connector for target '{target}'")]
    EmptyHostname { target: String },

    /// A TCP endpoint is missing its host or uses port 0.
    #[error("invalid TCP endpoint for backend '{backend}': {detail}")]
    InvalidTcpEndpoint { backend: String, detail: String },

    /// An IPC endpoint has an empty path.
    #[error("empty IPC path for backend '{backend}'")]
    EmptyIpcPath { backend: String },
}

/// Non-fatal findings reported while building a route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigWarning {
    /// A frontend connector names a backend that does not exist; its
    /// hostnames get no route.
    UnknownTarget { hostname: String, target: String },

    /// A hostname is listed by more than one frontend connector. The first
    /// registration is kept.
    DuplicateHostname {
        hostname: String,
        kept: String,
        ignored: String,
    },

    /// A backend connector has neither a TCP nor an IPC endpoint.
    NoEndpoint { backend: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnknownTarget { hostname, target } => {
                write!(f, "hostname '{hostname}' targets unknown backend '{target}'")
            }
            ConfigWarning::DuplicateHostname {
                hostname,
                kept,
                ignored,
            } => write!(
                f,
                "hostname '{hostname}' listed more than once (kept '{kept}', ignored '{ignored}')"
            ),
            ConfigWarning::NoEndpoint { backend } => {
                write!(f, "backend '{backend}' has no tcp or ipc endpoint")
            }
        }
    }
}

/// Why a frontend connection was closed before reaching the relay phase.
#[derive(Debug, Error)]
pub enum ConnectionFault {
    /// The admission gate is passive.
    #[error("proxy is not accepting connections")]
    Passive,

    /// The first chunk was empty or could not be read.
    #[error("no usable first chunk: {0}")]
    MalformedInput(String),

    /// No host key could be extracted, or no route matches it.
    #[error("no route for host {host:?}")]
    NoRoute { host: Option<String> },

    /// The matching route has neither a TCP nor an IPC endpoint.
    #[error("route '{host}' has no backend endpoint")]
    MisconfiguredRoute { host: String },

    /// The backend connection attempt failed.
    #[error("backend {target} unreachable: {source}")]
    BackendUnreachable {
        target: BackendTarget,
        #[source]
        source: io::Error,
    },

    /// The host lost its registry bucket during a concurrent reconfiguration.
    #[error("host '{host}' is no longer routed")]
    HostVanished { host: String },
}

impl ConnectionFault {
    /// Status code of the fixed response written to the frontend.
    pub fn status(&self) -> u16 {
        match self {
            ConnectionFault::Passive => SERVICE_UNAVAILABLE,
            ConnectionFault::MalformedInput(_) => BAD_REQUEST,
            ConnectionFault::NoRoute { .. } => NOT_FOUND,
            ConnectionFault::MisconfiguredRoute { .. } => BAD_GATEWAY,
            ConnectionFault::BackendUnreachable { .. } => SERVICE_UNAVAILABLE,
            ConnectionFault::HostVanished { .. } => NOT_FOUND,
        }
    }
}
