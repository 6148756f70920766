mod delivery;
mod dispatch;
mod observability;
mod sessions;

pub use delivery::*;
pub use dispatch::*;
pub use observability::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.dispatch.max_dispatchers_per_user == 0 {
            errors.push(ConfigError::error(
                "dispatch.max_dispatchers_per_user",
                "must be greater than 0",
            ));
        }

        if self.dispatch.tool_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "dispatch.tool_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.dispatch.default_agent_name.trim().is_empty() {
            errors.push(ConfigError::error(
                "dispatch.default_agent_name",
                "must not be empty",
            ));
        }

        if self.registry.max_agents_per_user == 0 {
            errors.push(ConfigError::error(
                "registry.max_agents_per_user",
                "must be greater than 0",
            ));
        }

        if self.registry.agent_warning_threshold > self.registry.max_agents_per_user {
            errors.push(ConfigError::warning(
                "registry.agent_warning_threshold",
                "is above max_agents_per_user; the warning state is unreachable",
            ));
        }

        if self.lifecycle.enabled && self.lifecycle.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "lifecycle.sweep_interval_secs",
                "must be greater than 0 when the sweeper is enabled",
            ));
        }

        if self.delivery.max_attempts == 0 {
            errors.push(ConfigError::error(
                "delivery.max_attempts",
                "must be at least 1",
            ));
        }

        if self.delivery.backoff_factor < 1.0 {
            errors.push(ConfigError::error(
                "delivery.backoff_factor",
                "must be >= 1.0",
            ));
        }

        if self.delivery.initial_backoff_ms > self.delivery.max_backoff_ms {
            errors.push(ConfigError::warning(
                "delivery.initial_backoff_ms",
                "is above max_backoff_ms; every retry will use the cap",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "must be within [0.0, 1.0]",
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn zero_dispatcher_limit_is_an_error() {
        let mut cfg = Config::default();
        cfg.dispatch.max_dispatchers_per_user = 0;
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Error);
        assert_eq!(issues[0].field, "dispatch.max_dispatchers_per_user");
    }

    #[test]
    fn unreachable_warning_threshold_is_a_warning() {
        let mut cfg = Config::default();
        cfg.registry.agent_warning_threshold = 500;
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn shrinking_backoff_is_rejected() {
        let mut cfg = Config::default();
        cfg.delivery.backoff_factor = 0.5;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "delivery.backoff_factor"));
    }

    #[test]
    fn display_tags_severity() {
        let e = ConfigError::error("delivery.max_attempts", "must be at least 1");
        assert_eq!(e.to_string(), "[ERROR] delivery.max_attempts: must be at least 1");
    }
}
