//! Route table and routing decisions.
//!
//! The route table maps a host key (exactly as received, case-sensitive) to
//! a backend target. It is derived from a whole configuration snapshot in one
//! pass and replaced wholesale on reconfiguration:
//! - Exact hostname match first, then the optional `*` default route
//! - Duplicate hostnames: first registration wins
//! - Unknown backend names yield no route
//! - Config updates are applied atomically; a lookup sees the old table or
//!   the new one, never a mix

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tracing::{debug, info};

use super::backend::BackendTarget;
use super::error::ConfigWarning;
use super::snapshot::ProxyConfig;

/// Host key of the default route.
pub const WILDCARD_HOST: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub hostname: String,
    /// Name of the backend connector this route was built from.
    pub backend: String,
    /// `None` when the backend has neither a TCP nor an IPC endpoint.
    pub target: Option<BackendTarget>,
}

/// Result of a routing decision.
#[derive(Debug, Clone)]
pub enum RoutingDecision {
    /// Route found. `host_key` is the table key that matched, which is
    /// [`WILDCARD_HOST`] for default-routed connections.
    Matched { host_key: String, route: Route },
    /// No matching route found.
    NoMatch { reason: String },
}

/// Immutable snapshot of route data for lock-free reads.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct RouteSnapshot {
    routes: HashMap<String, Route>,
}

impl RouteSnapshot {
    /// Build a snapshot from a configuration.
    ///
    /// Pure function of its input; warnings are returned for the caller to
    /// surface.
    pub fn build(config: &ProxyConfig) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        let mut targets = HashMap::new();
        for backend in &config.backend_connectors {
            let target = BackendTarget::resolve(&backend.endpoints);
            if target.is_none() {
                warnings.push(ConfigWarning::NoEndpoint {
                    backend: backend.name.clone(),
                });
            }
            targets.insert(backend.name.as_str(), target);
        }

        let mut routes: HashMap<String, Route> = HashMap::new();
        for frontend in &config.frontend_connectors {
            let Some(target) = targets.get(frontend.target.as_str()) else {
                for hostname in &frontend.host_headers {
                    warnings.push(ConfigWarning::UnknownTarget {
                        hostname: hostname.clone(),
                        target: frontend.target.clone(),
                    });
                }
                continue;
            };

            for hostname in &frontend.host_headers {
                if let Some(existing) = routes.get(hostname) {
                    warnings.push(ConfigWarning::DuplicateHostname {
                        hostname: hostname.clone(),
                        kept: existing.backend.clone(),
                        ignored: frontend.target.clone(),
                    });
                    continue;
                }

                routes.insert(
                    hostname.clone(),
                    Route {
                        hostname: hostname.clone(),
                        backend: frontend.target.clone(),
                        target: target.clone(),
                    },
                );
            }
        }

        (Self { routes }, warnings)
    }

    /// Get the route registered for exactly this key.
    pub fn get(&self, host_key: &str) -> Option<&Route> {
        self.routes.get(host_key)
    }

    /// Routed hostnames, sorted.
    pub fn hostnames(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }

    pub fn host_set(&self) -> HashSet<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Route table holding the active snapshot.
///
/// Uses ArcSwap for lock-free atomic config updates.
/// Readers get consistent snapshots without blocking.
/// Writers atomically swap in new snapshots.
pub struct RouteTable {
    snapshot: ArcSwap<RouteSnapshot>,
}

impl RouteTable {
    /// Create a new empty route table.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RouteSnapshot::default()),
        }
    }

    /// Replace the active snapshot in a single pointer swap. Readers holding
    /// the old snapshot keep using it until they drop it.
    pub fn install(&self, snapshot: RouteSnapshot) {
        let route_count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        info!(route_count = route_count, "Route table updated atomically");
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.load_full()
    }

    /// Make a routing decision for a host key.
    pub fn route(&self, host: &str) -> RoutingDecision {
        let snapshot = self.snapshot.load();

        if let Some(route) = snapshot.get(host) {
            debug!(hostname = %host, backend = %route.backend, "Route matched");
            return RoutingDecision::Matched {
                host_key: host.to_string(),
                route: route.clone(),
            };
        }

        if let Some(route) = snapshot.get(WILDCARD_HOST) {
            debug!(hostname = %host, backend = %route.backend, "Route matched by default route");
            return RoutingDecision::Matched {
                host_key: WILDCARD_HOST.to_string(),
                route: route.clone(),
            };
        }

        RoutingDecision::NoMatch {
            reason: format!("No route for hostname '{}'", host),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
