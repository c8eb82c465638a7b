//! Agent configuration

use anyhow::Result;
use guard_lib::remediation::RemediationConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration, read from `GUARD_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HTTP port for events, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding trained model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// JSON snapshot backing the cloud clients
    #[serde(default)]
    pub cloud_snapshot: Option<PathBuf>,

    /// CPU lookback window in seconds
    #[serde(default = "default_metric_window")]
    pub metric_window_secs: u64,

    #[serde(default = "default_metric_period")]
    pub metric_period_secs: u32,

    #[serde(default)]
    pub respect_grace_period: bool,

    /// Refuse to act when no candidate reported CPU data
    #[serde(default)]
    pub require_metric_data: bool,
}

fn default_service_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "opsguard-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_metric_window() -> u64 {
    600
}

fn default_metric_period() -> u32 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            models_dir: default_models_dir(),
            cloud_snapshot: None,
            metric_window_secs: default_metric_window(),
            metric_period_secs: default_metric_period(),
            respect_grace_period: false,
            require_metric_data: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GUARD"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that feed every remediation invocation
    pub fn validate(&self) -> Result<()> {
        self.remediation().validate()?;
        Ok(())
    }

    pub fn remediation(&self) -> RemediationConfig {
        RemediationConfig {
            metric_window_secs: self.metric_window_secs,
            metric_period_secs: self.metric_period_secs,
            respect_grace_period: self.respect_grace_period,
            require_metric_data: self.require_metric_data,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_remediation_defaults() {
        let config = AgentConfig::default();
        let remediation = config.remediation();
        let expected = RemediationConfig::default();

        assert_eq!(config.api_port, 8080);
        assert_eq!(remediation.metric_window_secs, expected.metric_window_secs);
        assert_eq!(remediation.metric_period_secs, expected.metric_period_secs);
        assert!(!remediation.respect_grace_period);
    }

    #[test]
    fn test_rejects_out_of_range_window() {
        let config = AgentConfig {
            metric_window_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_strict_mode_carries_over() {
        let config = AgentConfig {
            require_metric_data: true,
            ..Default::default()
        };
        assert!(config.remediation().require_metric_data);
    }
}
