//! The outcome of a single admission check.

use std::time::{Duration, Instant};

/// Result of [`AdmissionController::check`](super::AdmissionController::check).
///
/// A rejection is not an error; callers translate `allowed == false` into
/// their own "too many requests" response using [`retry_after`](Self::retry_after).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the caller may proceed with the protected operation
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: Instant,
    /// Time from the check until `reset_at`
    pub retry_after: Duration,
    /// The policy's per-window limit
    pub limit: u64,
}

impl AdmissionDecision {
    pub(crate) fn new(
        allowed: bool,
        remaining: u64,
        limit: u64,
        reset_at: Instant,
        now: Instant,
    ) -> Self {
        Self {
            allowed,
            remaining,
            reset_at,
            retry_after: reset_at.saturating_duration_since(now),
            limit,
        }
    }

    /// `retry_after` in whole seconds, rounded up, never below one.
    ///
    /// Suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> u64 {
        retry_after_secs(self.retry_after)
    }
}

/// Round a retry delay up to whole seconds, never below one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let rounded = if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    };
    rounded.max(1)
}
