//! Handler-facing admission guard.
//!
//! Endpoint handlers (image generation, search, daily quote) hold one
//! [`AdmissionGuard`] each and call [`AdmissionGuard::admit`] before doing
//! any expensive work.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::admission::{
    retry_after_secs, AdmissionController, AdmissionDecision, Policy, ProtectedOperation,
    RequestMetadata,
};
use crate::error::Result;

/// A request was rejected because its client exhausted the policy's window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Throttled {
    /// The policy that rejected the request
    pub policy: String,
    /// End of the exhausted window
    pub reset_at: Instant,
    /// Time until the window ends
    pub retry_after: Duration,
    /// User-visible explanation
    pub message: String,
}

impl Throttled {
    fn from_decision(policy: &Policy, decision: &AdmissionDecision) -> Self {
        let secs = decision.retry_after_secs();
        Self {
            policy: policy.name().to_string(),
            reset_at: decision.reset_at,
            retry_after: decision.retry_after,
            message: format!(
                "Too many requests; try again in {} second{}",
                secs,
                if secs == 1 { "" } else { "s" }
            ),
        }
    }

    /// Whole seconds for a `Retry-After` header, rounded up and at least one.
    pub fn retry_after_secs(&self) -> u64 {
        retry_after_secs(self.retry_after)
    }
}

/// Binds a shared controller to one protected operation.
#[derive(Debug, Clone)]
pub struct AdmissionGuard {
    controller: Arc<AdmissionController>,
    operation: ProtectedOperation,
    policy: Arc<Policy>,
}

impl AdmissionGuard {
    /// Create a guard, resolving the operation's policy up front.
    ///
    /// Fails with `UnknownPolicy` if the controller's registry has no policy
    /// for the operation.
    pub fn new(controller: Arc<AdmissionController>, operation: ProtectedOperation) -> Result<Self> {
        let policy = controller.registry().require(operation.policy_name())?;
        Ok(Self {
            controller,
            operation,
            policy,
        })
    }

    /// Admit or throttle a request described by `metadata`.
    #[instrument(skip(self, metadata), fields(operation = %self.operation))]
    pub fn admit(&self, metadata: &RequestMetadata) -> std::result::Result<AdmissionDecision, Throttled> {
        let identity = metadata.identity();
        let decision = self.controller.check_policy(&self.policy, identity.as_str());

        if decision.allowed {
            Ok(decision)
        } else {
            debug!(
                identity = %identity,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Request throttled"
            );
            Err(Throttled::from_decision(&self.policy, &decision))
        }
    }

    pub fn operation(&self) -> ProtectedOperation {
        self.operation
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
