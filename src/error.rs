//! Error types for Turnstile.
//!
//! Throttling is not an error: a rejected check is an ordinary
//! [`AdmissionDecision`](crate::admission::AdmissionDecision) with
//! `allowed == false`. These variants cover wiring and configuration faults.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A check or reset referenced a policy that was never registered
    #[error("Unknown rate limit policy: {0}")]
    UnknownPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
