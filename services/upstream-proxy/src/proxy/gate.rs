//! Admission gate.
//!
//! While passive, new connections are answered with 503 and closed.
//! Connections that were already admitted are never affected by the gate.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Passive,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Passive => "passive",
        }
    }
}

#[derive(Debug)]
pub struct LifecycleGate {
    active: AtomicBool,
}

impl LifecycleGate {
    pub fn new(initial: LifecycleState) -> Self {
        Self {
            active: AtomicBool::new(initial == LifecycleState::Active),
        }
    }

    /// Admit new connections. Idempotent.
    pub fn start(&self) -> LifecycleState {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("Proxy is now active");
        }
        LifecycleState::Active
    }

    /// Stop admitting new connections. Idempotent.
    pub fn stop(&self) -> LifecycleState {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Proxy is now passive");
        }
        LifecycleState::Passive
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_active() {
            LifecycleState::Active
        } else {
            LifecycleState::Passive
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new(LifecycleState::Passive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_transitions() {
        let gate = LifecycleGate::default();
        assert_eq!(gate.state(), LifecycleState::Passive);

        assert_eq!(gate.start(), LifecycleState::Active);
        assert_eq!(gate.start(), LifecycleState::Active);
        assert!(gate.is_active());

        assert_eq!(gate.stop(), LifecycleState::Passive);
        assert_eq!(gate.stop(), LifecycleState::Passive);
        assert!(!gate.is_active());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleState::Active).unwrap();
        assert_eq!(json, "\"active\"");
        assert_eq!(LifecycleState::Passive.as_str(), "passive");
    }
}
