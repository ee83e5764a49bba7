//! Routing configuration snapshots.
//!
//! A snapshot is the whole routing configuration at one point in time. Three
//! JSON shapes are accepted and normalised to the connector form:
//!
//! ```text
//! { "frontend_connectors": [{ "host_headers": ["a.test"], "target": "web" }],
//!   "backend_connectors":  [{ "name": "web", "endpoints": { "tcp": { "host": "127.0.0.1", "port": 3001 } } }] }
//!
//! { "host_headers": { "a.test": "web" },
//!   "backends":     { "web": { "ipc": "web.sock" } } }
//!
//! { "routes": [{ "hostnames": ["a.test"], "endpoint": { "tcp": { "host": "127.0.0.1", "port": 3001 } } }] }
//! ```
//!
//! Unknown top-level fields are ignored, but one of the route keys
//! (`frontend_connectors`, `host_headers`, `routes`) must be present.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Canonical routing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotShape")]
pub struct ProxyConfig {
    pub frontend_connectors: Vec<FrontendConnector>,
    pub backend_connectors: Vec<BackendConnector>,
}

/// Hostnames routed to one named backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendConnector {
    pub host_headers: Vec<String>,
    pub target: String,
}

/// A named backend and the endpoints it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConnector {
    pub name: String,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpEndpoint>,
    /// Local socket name or path, normalised to the platform namespace when
    /// the route table is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// Parse a JSON snapshot in any of the accepted shapes.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parse an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Reject snapshots that cannot produce a meaningful route table.
    ///
    /// Unknown targets and duplicate hostnames are not errors; they are
    /// reported as warnings by the route table builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for backend in &self.backend_connectors {
            if backend.name.is_empty() {
                return Err(ConfigError::EmptyBackendName);
            }
            if !names.insert(backend.name.as_str()) {
                return Err(ConfigError::DuplicateBackend(backend.name.clone()));
            }
            if let Some(tcp) = &backend.endpoints.tcp {
                if tcp.host.is_empty() {
                    return Err(ConfigError::InvalidTcpEndpoint {
                        backend: backend.name.clone(),
                        detail: "host is empty".to_string(),
                    });
                }
                if tcp.port == 0 {
                    return Err(ConfigError::InvalidTcpEndpoint {
                        backend: backend.name.clone(),
                        detail: "port 0".to_string(),
                    });
                }
            }
            if backend.endpoints.ipc.as_deref() == Some("") {
                return Err(ConfigError::EmptyIpcPath {
                    backend: backend.name.clone(),
                });
            }
        }

        for frontend in &self.frontend_connectors {
            if frontend.host_headers.iter().any(String::is_empty) {
                return Err(ConfigError::EmptyHostname {
                    target: frontend.target.clone(),
                });
            }
        }

        Ok(())
    }

    /// Number of hostnames listed across all frontend connectors.
    pub fn hostname_count(&self) -> usize {
        self.frontend_connectors
            .iter()
            .map(|f| f.host_headers.len())
            .sum()
    }
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    hostnames: Vec<String>,
    #[serde(default)]
    endpoint: Endpoints,
}

/// Wire shapes, tried in order. Each shape needs its route key, so a
/// snapshot with none of them (or a misspelled one) fails to parse instead
/// of clearing the table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotShape {
    HostMap {
        host_headers: BTreeMap<String, String>,
        #[serde(default)]
        backends: BTreeMap<String, Endpoints>,
    },
    RouteList {
        routes: Vec<RouteEntry>,
    },
    Connectors {
        frontend_connectors: Vec<FrontendConnector>,
        #[serde(default)]
        backend_connectors: Vec<BackendConnector>,
    },
}

impl TryFrom<SnapshotShape> for ProxyConfig {
    type Error = ConfigError;

    fn try_from(shape: SnapshotShape) -> Result<Self, Self::Error> {
        let config = match shape {
            SnapshotShape::Connectors {
                frontend_connectors,
                backend_connectors,
            } => ProxyConfig {
                frontend_connectors,
                backend_connectors,
            },
            SnapshotShape::HostMap {
                host_headers,
                backends,
            } => {
                let mut by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for (hostname, target) in host_headers {
                    by_target.entry(target).or_default().push(hostname);
                }
                ProxyConfig {
                    frontend_connectors: by_target
                        .into_iter()
                        .map(|(target, host_headers)| FrontendConnector {
                            host_headers,
                            target,
                        })
                        .collect(),
                    backend_connectors: backends
                        .into_iter()
                        .map(|(name, endpoints)| BackendConnector { name, endpoints })
                        .collect(),
                }
            }
            SnapshotShape::RouteList { routes } => {
                let mut config = ProxyConfig::default();
                for (index, route) in routes.into_iter().enumerate() {
                    let name = format!("route-{index}");
                    config.frontend_connectors.push(FrontendConnector {
                        host_headers: route.hostnames,
                        target: name.clone(),
                    });
                    config.backend_connectors.push(BackendConnector {
                        name,
                        endpoints: route.endpoint,
                    });
                }
                config
            }
        };
        Ok(config)
    }
}
