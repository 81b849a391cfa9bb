//! Fixed-window counter storage.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::decision::AdmissionDecision;
use super::policy::Policy;

/// Key of a counter slot: one per (policy, identity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// The policy name
    pub policy: String,
    /// The client identity
    pub identity: String,
}

impl SlotKey {
    pub fn new(policy: &str, identity: &str) -> Self {
        Self {
            policy: policy.to_string(),
            identity: identity.to_string(),
        }
    }
}

/// Counter state for one live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Admissions counted in this window
    pub count: u64,
    /// End of the window; the slot is expired once `now >= reset_at`
    pub reset_at: Instant,
}

impl WindowState {
    /// A fresh window holding its first admission.
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// Whether the window has ended. The boundary instant counts as ended.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.reset_at <= now
    }
}

/// Concurrent map from (policy, identity) to window state.
///
/// Each check holds the shard lock for its key across the whole
/// read-compare-increment sequence, so racing callers on one slot are
/// serialized while unrelated keys in other shards proceed in parallel.
#[derive(Debug, Default)]
pub struct WindowStore {
    slots: DashMap<SlotKey, WindowState>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `policy` for `identity` at `now`.
    pub fn check(&self, policy: &Policy, identity: &str, now: Instant) -> AdmissionDecision {
        let max = policy.max_requests();

        match self.slots.entry(SlotKey::new(policy.name(), identity)) {
            Entry::Vacant(vacant) => {
                let state = WindowState::open(now, policy.window());
                vacant.insert(state);
                debug!(
                    policy = policy.name(),
                    identity = identity,
                    limit = max,
                    "Opened rate limit window"
                );
                AdmissionDecision::new(true, max - 1, max, state.reset_at, now)
            }
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();

                if state.is_expired(now) {
                    *state = WindowState::open(now, policy.window());
                    debug!(
                        policy = policy.name(),
                        identity = identity,
                        limit = max,
                        "Rate limit window expired, opened a new one"
                    );
                    return AdmissionDecision::new(true, max - 1, max, state.reset_at, now);
                }

                if state.count >= max {
                    debug!(
                        policy = policy.name(),
                        identity = identity,
                        count = state.count,
                        limit = max,
                        "Rate limit exceeded"
                    );
                    return AdmissionDecision::new(false, 0, max, state.reset_at, now);
                }

                state.count += 1;
                debug_assert!(state.count <= max);
                AdmissionDecision::new(true, max - state.count, max, state.reset_at, now)
            }
        }
    }

    /// Remove the slot for (policy, identity). Returns whether one existed.
    pub fn remove(&self, policy: &str, identity: &str) -> bool {
        self.slots.remove(&SlotKey::new(policy, identity)).is_some()
    }

    /// Snapshot of a slot's state, expired or not.
    pub fn get(&self, policy: &str, identity: &str) -> Option<WindowState> {
        self.slots
            .get(&SlotKey::new(policy, identity))
            .map(|state| *state)
    }

    /// Drop every slot whose window has ended. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, state| {
            let live = !state.is_expired(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}
