//! Public admission control API.

use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::decision::AdmissionDecision;
use super::policy::{Policy, PolicyRegistry};
use super::window::{WindowState, WindowStore};
use crate::error::Result;

/// Fixed-window admission controller.
///
/// One instance is built per process and shared as `Arc<AdmissionController>`
/// with every handler that needs it. Independent instances never share
/// counters, which keeps tests isolated.
#[derive(Debug)]
pub struct AdmissionController {
    registry: Arc<PolicyRegistry>,
    store: WindowStore,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Create a controller over `registry` using the system clock.
    pub fn new(registry: PolicyRegistry) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock::new()))
    }

    /// Create a controller with an explicit time source.
    pub fn with_clock(registry: PolicyRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(registry),
            store: WindowStore::new(),
            clock,
        }
    }

    /// Count a request from `identity` against the named policy.
    ///
    /// Returns [`TurnstileError::UnknownPolicy`](crate::error::TurnstileError::UnknownPolicy)
    /// if no such policy is registered. Throttling is reported through
    /// `allowed == false`, never as an error.
    pub fn check(&self, policy_name: &str, identity: &str) -> Result<AdmissionDecision> {
        let policy = self.registry.require(policy_name)?;
        Ok(self.check_policy(&policy, identity))
    }

    /// Count a request against an already-resolved policy.
    pub fn check_policy(&self, policy: &Policy, identity: &str) -> AdmissionDecision {
        let now = self.clock.now();

        trace!(
            policy = policy.name(),
            identity = identity,
            "Checking admission"
        );

        self.store.check(policy, identity, now)
    }

    /// Forget the window for (policy, identity) so the next check starts fresh.
    pub fn reset(&self, policy_name: &str, identity: &str) -> Result<()> {
        let policy = self.registry.require(policy_name)?;
        if self.store.remove(policy.name(), identity) {
            debug!(
                policy = policy.name(),
                identity = identity,
                "Reset rate limit window"
            );
        }
        Ok(())
    }

    /// Remove every expired slot. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.store.sweep(self.clock.now());
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.store.len(),
                "Swept expired rate limit windows"
            );
        }
        removed
    }

    /// Current state of a slot, including expired slots not yet reclaimed.
    pub fn window_state(&self, policy_name: &str, identity: &str) -> Option<WindowState> {
        self.store.get(policy_name, identity)
    }

    /// Number of stored slots, live or awaiting reclamation.
    pub fn active_slots(&self) -> usize {
        self.store.len()
    }

    /// Drop all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }
}
