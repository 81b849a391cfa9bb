//! Named rate limit policies and the registry that holds them.
//!
//! Policies are built once at process start, validated, and shared as
//! `Arc<Policy>` handles. Nothing in the registry is mutable after
//! construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Default window shared by the built-in policies.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Longest accepted window (one year).
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A fixed-window limit: at most `max_requests` admissions per `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    window: Duration,
    max_requests: u64,
}

impl Policy {
    /// Create a validated policy.
    pub fn new(name: impl Into<String>, window: Duration, max_requests: u64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TurnstileError::Config(
                "policy name must not be empty".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::Config(format!(
                "policy '{}' must have a non-zero window",
                name
            )));
        }
        if window > MAX_WINDOW {
            return Err(TurnstileError::Config(format!(
                "policy '{}' window exceeds {} seconds",
                name,
                MAX_WINDOW.as_secs()
            )));
        }
        if max_requests == 0 {
            return Err(TurnstileError::Config(format!(
                "policy '{}' must allow at least one request",
                name
            )));
        }
        Ok(Self {
            name,
            window,
            max_requests,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of each counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }
}

/// Serialized form of a policy, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy name referenced by call sites
    pub name: String,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Admissions allowed per window
    pub max_requests: u64,
}

impl TryFrom<&PolicyConfig> for Policy {
    type Error = TurnstileError;

    fn try_from(config: &PolicyConfig) -> Result<Self> {
        Policy::new(
            config.name.clone(),
            Duration::from_millis(config.window_ms),
            config.max_requests,
        )
    }
}

impl From<&Policy> for PolicyConfig {
    fn from(policy: &Policy) -> Self {
        Self {
            name: policy.name.clone(),
            window_ms: u64::try_from(policy.window.as_millis()).unwrap_or(u64::MAX),
            max_requests: policy.max_requests,
        }
    }
}

/// The expensive operations guarded by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectedOperation {
    /// AI image generation
    ImageGeneration,
    /// Verse search
    Search,
    /// Daily quote retrieval
    DailyQuote,
}

impl ProtectedOperation {
    /// All protected operations.
    pub const ALL: [ProtectedOperation; 3] = [
        ProtectedOperation::ImageGeneration,
        ProtectedOperation::Search,
        ProtectedOperation::DailyQuote,
    ];

    /// Name of the policy this operation is checked against.
    pub fn policy_name(&self) -> &'static str {
        match self {
            ProtectedOperation::ImageGeneration => "image-generation",
            ProtectedOperation::Search => "search",
            ProtectedOperation::DailyQuote => "daily-quote",
        }
    }

    fn default_max_requests(&self) -> u64 {
        match self {
            ProtectedOperation::ImageGeneration => 5,
            ProtectedOperation::Search => 30,
            ProtectedOperation::DailyQuote => 10,
        }
    }
}

impl std::fmt::Display for ProtectedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.policy_name())
    }
}

/// Immutable set of policies indexed by name.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<Policy>>,
}

impl PolicyRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new(policies: impl IntoIterator<Item = Policy>) -> Result<Self> {
        let mut map = HashMap::new();
        for policy in policies {
            let name = policy.name.clone();
            if map.insert(name.clone(), Arc::new(policy)).is_some() {
                return Err(TurnstileError::Config(format!(
                    "duplicate policy name '{}'",
                    name
                )));
            }
        }
        Ok(Self { policies: map })
    }

    /// The default policies for every [`ProtectedOperation`].
    pub fn builtin() -> Self {
        let policies = ProtectedOperation::ALL.iter().map(|op| Policy {
            name: op.policy_name().to_string(),
            window: DEFAULT_WINDOW,
            max_requests: op.default_max_requests(),
        });
        Self {
            policies: policies.map(|p| (p.name.clone(), Arc::new(p))).collect(),
        }
    }

    /// Build a registry from configuration entries.
    ///
    /// An empty list yields the built-in policies.
    pub fn from_configs(configs: &[PolicyConfig]) -> Result<Self> {
        if configs.is_empty() {
            info!("No policies configured, using built-in defaults");
            return Ok(Self::builtin());
        }

        let policies = configs
            .iter()
            .map(Policy::try_from)
            .collect::<Result<Vec<_>>>()?;
        let registry = Self::new(policies)?;
        info!(count = registry.len(), "Loaded rate limit policies");
        Ok(registry)
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    /// Look up a policy by name, failing with [`TurnstileError::UnknownPolicy`].
    pub fn require(&self, name: &str) -> Result<Arc<Policy>> {
        self.get(name)
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// All policies, ordered by name.
    pub fn policies(&self) -> Vec<Arc<Policy>> {
        let mut all: Vec<_> = self.policies.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_policies() {
        let registry = PolicyRegistry::builtin();
        assert_eq!(registry.len(), 3);

        let image = registry.get("image-generation").unwrap();
        assert_eq!(image.window(), Duration::from_secs(60));
        assert_eq!(image.max_requests(), 5);

        assert_eq!(registry.get("search").unwrap().max_requests(), 30);
        assert_eq!(registry.get("daily-quote").unwrap().max_requests(), 10);
    }

    #[test]
    fn test_every_operation_has_a_builtin_policy() {
        let registry = PolicyRegistry::builtin();
        for op in ProtectedOperation::ALL {
            assert!(registry.get(op.policy_name()).is_some(), "missing {}", op);
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(Policy::new("ok", Duration::from_secs(1), 1).is_ok());
        assert!(matches!(
            Policy::new("", Duration::from_secs(1), 1),
            Err(TurnstileError::Config(_))
        ));
        assert!(matches!(
            Policy::new("zero-window", Duration::ZERO, 1),
            Err(TurnstileError::Config(_))
        ));
        assert!(matches!(
            Policy::new("huge-window", MAX_WINDOW + Duration::from_secs(1), 1),
            Err(TurnstileError::Config(_))
        ));
        assert!(matches!(
            Policy::new("zero-max", Duration::from_secs(1), 0),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = PolicyRegistry::new(vec![
            Policy::new("search", Duration::from_secs(60), 30).unwrap(),
            Policy::new("search", Duration::from_secs(10), 3).unwrap(),
        ]);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_from_configs() {
        let configs = vec![
            PolicyConfig {
                name: "uploads".to_string(),
                window_ms: 1_000,
                max_requests: 2,
            },
            PolicyConfig {
                name: "exports".to_string(),
                window_ms: 3_600_000,
                max_requests: 100,
            },
        ];
        let registry = PolicyRegistry::from_configs(&configs).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("uploads").unwrap().window(),
            Duration::from_millis(1_000)
        );
        assert!(registry.get("search").is_none());

        let names: Vec<_> = registry
            .policies()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["exports", "uploads"]);
    }

    #[test]
    fn test_empty_configs_use_builtin() {
        let registry = PolicyRegistry::from_configs(&[]).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_invalid_config_entry_rejected() {
        let configs = vec![PolicyConfig {
            name: "broken".to_string(),
            window_ms: 0,
            max_requests: 5,
        }];
        assert!(PolicyRegistry::from_configs(&configs).is_err());
    }

    #[test]
    fn test_require_unknown_policy() {
        let registry = PolicyRegistry::builtin();
        match registry.require("nope") {
            Err(TurnstileError::UnknownPolicy(name)) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownPolicy, got {:?}", other),
        }
    }

    #[test]
    fn test_policy_config_conversion() {
        let policy = Policy::new("search", Duration::from_secs(60), 30).unwrap();
        let config = PolicyConfig::from(&policy);
        assert_eq!(config.window_ms, 60_000);
        assert_eq!(Policy::try_from(&config).unwrap(), policy);
    }
}
