//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::admission::{PolicyConfig, PolicyRegistry};
use crate::error::{Result, TurnstileError};

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LOGGING__LEVEL`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Rate limit policies; empty means the built-in defaults
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Seconds between sweeps of expired windows; 0 disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl AdmissionConfig {
    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load layered configuration: defaults, then the optional file, then
    /// `TURNSTILE__*` environment variables.
    ///
    /// Runs before logging is set up, so it emits no events itself.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_layered(path, environment())
    }

    fn load_layered(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: TurnstileConfig = builder.add_source(env).build()?.try_deserialize()?;

        Ok(config)
    }

    /// Build the policy registry described by this configuration.
    pub fn registry(&self) -> Result<PolicyRegistry> {
        PolicyRegistry::from_configs(&self.policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_environment() -> config::Environment {
        environment().source(Some(config::Map::new()))
    }

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.admission.sweep_interval(), Some(Duration::from_secs(60)));
        assert!(config.policies.is_empty());
        assert_eq!(config.registry().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
logging:
  level: debug
  json: true
admission:
  sweep_interval_secs: 15
policies:
  - name: image-generation
    window_ms: 60000
    max_requests: 2
  - name: search
    window_ms: 1000
    max_requests: 100
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.admission.sweep_interval(), Some(Duration::from_secs(15)));

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("image-generation").unwrap().max_requests(), 2);
        assert!(registry.get("daily-quote").is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = TurnstileConfig::from_yaml("logging:\n  level: warn\n").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.admission.sweep_interval_secs, 60);
    }

    #[test]
    fn test_zero_interval_disables_sweeper() {
        let config = TurnstileConfig::from_yaml("admission:\n  sweep_interval_secs: 0\n").unwrap();
        assert_eq!(config.admission.sweep_interval(), None);
    }

    #[test]
    fn test_duplicate_policies_rejected() {
        let yaml = r#"
policies:
  - name: search
    window_ms: 60000
    max_requests: 30
  - name: search
    window_ms: 60000
    max_requests: 10
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.registry(), Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_zero_limit_policy_rejected() {
        let yaml = r#"
policies:
  - name: search
    window_ms: 60000
    max_requests: 0
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let result = TurnstileConfig::from_yaml("policies: [not, a, policy");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TurnstileConfig::load_layered(None, no_environment()).unwrap();
        assert_eq!(config.admission.sweep_interval_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "admission:\n  sweep_interval_secs: 5\npolicies:\n  - name: uploads\n    window_ms: 500\n    max_requests: 1\n",
        )
        .unwrap();

        let config = TurnstileConfig::load_layered(Some(&path), no_environment()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.admission.sweep_interval_secs, 5);
        assert_eq!(config.policies.len(), 1);
        assert_eq!(config.policies[0].name, "uploads");
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = std::env::temp_dir().join(format!("turnstile-env-{}.yaml", std::process::id()));
        std::fs::write(&path, "admission:\n  sweep_interval_secs: 5\nlogging:\n  level: warn\n").unwrap();

        let mut vars = config::Map::new();
        vars.insert(
            "TURNSTILE__ADMISSION__SWEEP_INTERVAL_SECS".to_string(),
            "7".to_string(),
        );
        vars.insert("TURNSTILE__LOGGING__JSON".to_string(), "true".to_string());
        vars.insert("UNRELATED__LOGGING__LEVEL".to_string(), "trace".to_string());

        let config =
            TurnstileConfig::load_layered(Some(&path), environment().source(Some(vars))).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.admission.sweep_interval_secs, 7);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let result = TurnstileConfig::from_file("/nonexistent/turnstile.yaml");
        assert!(matches!(result, Err(TurnstileError::Io(_))));
    }
}
