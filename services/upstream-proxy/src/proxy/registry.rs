//! Registry of frontend connections that are currently relaying.
//!
//! Every entry is stored once by id and indexed by the route key it matched
//! (`*` for wildcard-routed connections). Both maps live behind a single
//! mutex so they never disagree. The lock is never held across an await or
//! while a termination handle fires.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::ConnectionFault;

pub type ConnectionId = u64;

/// Fires the relay's teardown when sent on or dropped.
pub type TerminationHandle = oneshot::Sender<()>;

#[derive(Debug)]
struct ConnectionEntry {
    host_key: String,
    terminate: TerminationHandle,
}

/// Read-only view of one registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub host_key: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_id: HashMap<ConnectionId, ConnectionEntry>,
    by_host: HashMap<String, HashSet<ConnectionId>>,
    /// Hosts present in the installed route table.
    routed: HashSet<String>,
}

impl RegistryState {
    /// Remove an entry from both indices, dropping a stale bucket once empty.
    fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.by_id.remove(&id)?;
        if let Some(bucket) = self.by_host.get_mut(&entry.host_key) {
            bucket.remove(&id);
            if bucket.is_empty() && !self.routed.contains(&entry.host_key) {
                self.by_host.remove(&entry.host_key);
            }
        }
        Some(entry)
    }
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate the next connection id. Ids are never reused.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create empty buckets for hosts about to be routed.
    ///
    /// Called before a new route table is installed so that a connection
    /// routed by the new table always finds its bucket.
    pub fn ensure_hosts<'a, I>(&self, hosts: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut state = self.lock();
        for host in hosts {
            state.by_host.entry(host.clone()).or_default();
        }
    }

    /// Record the routed host set once a table is installed.
    ///
    /// Empty buckets of hosts that are no longer routed are dropped now;
    /// non-empty ones are dropped when their last connection unregisters.
    pub fn sync_hosts(&self, hosts: HashSet<String>) {
        let mut state = self.lock();
        for host in &hosts {
            state.by_host.entry(host.clone()).or_default();
        }
        state
            .by_host
            .retain(|host, bucket| hosts.contains(host) || !bucket.is_empty());
        state.routed = hosts;
    }

    /// Track a relaying connection under its id and host key.
    pub fn register(
        &self,
        id: ConnectionId,
        host_key: &str,
        terminate: TerminationHandle,
    ) -> Result<(), ConnectionFault> {
        let mut state = self.lock();
        if !state.by_host.contains_key(host_key) {
            drop(state);
            warn!(id, host = %host_key, "Registration rejected: host has no bucket");
            return Err(ConnectionFault::HostVanished {
                host: host_key.to_string(),
            });
        }
        state.by_host.entry(host_key.to_string()).or_default().insert(id);
        state.by_id.insert(
            id,
            ConnectionEntry {
                host_key: host_key.to_string(),
                terminate,
            },
        );
        drop(state);

        debug!(id, host = %host_key, "Connection registered");
        Ok(())
    }

    /// Remove a connection and fire its termination handle.
    ///
    /// Returns false when the id was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(entry) => {
                // The relay may already be gone.
                let _ = entry.terminate.send(());
                debug!(id, host = %entry.host_key, "Connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Terminate every connection routed under `host_key`.
    pub fn disconnect(&self, host_key: &str) -> usize {
        let ids: Vec<ConnectionId> = self
            .lock()
            .by_host
            .get(host_key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default();

        ids.into_iter().filter(|id| self.unregister(*id)).count()
    }

    /// Terminate every registered connection.
    pub fn disconnect_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.lock().by_id.keys().copied().collect();
        ids.into_iter().filter(|id| self.unregister(*id)).count()
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for_host(&self, host_key: &str) -> usize {
        self.lock().by_host.get(host_key).map_or(0, HashSet::len)
    }

    /// Registered connections, ordered by id.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<ConnectionInfo> = self
            .lock()
            .by_id
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                host_key: entry.host_key.clone(),
            })
            .collect();
        connections.sort_by_key(|c| c.id);
        connections
    }

    /// Host keys that currently have a bucket, sorted.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.lock().by_host.keys().cloned().collect();
        hosts.sort();
        hosts
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
