//! Flow engine configuration.
//!
//! `FlowEngineConfig` represents the `config.toml` section that controls
//! session timers and checkpoint cleanup. All fields have defaults; the
//! loader in `ledgerflow-infra` falls back to them when the file is missing
//! or malformed.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Timer and cleanup configuration for the flow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEngineConfig {
    /// How long to wait for an acknowledgment before resending the last
    /// session message, in milliseconds.
    #[serde(default = "default_resend_window_ms")]
    pub session_message_resend_window_ms: u64,

    /// How long a session may be silent before it transitions to error,
    /// in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub session_heartbeat_timeout_window_ms: u64,

    /// Grace period before a terminal checkpoint is purged, in milliseconds.
    #[serde(default = "default_cleanup_time_ms")]
    pub processing_flow_cleanup_time_ms: u64,

    /// Redelivery budget embedders apply before treating a transient fault
    /// as fatal.
    #[serde(default = "default_max_flow_retries")]
    pub max_flow_retries: u32,
}

fn default_resend_window_ms() -> u64 {
    120_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    500_000
}

fn default_cleanup_time_ms() -> u64 {
    600_000
}

fn default_max_flow_retries() -> u32 {
    5
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            session_message_resend_window_ms: default_resend_window_ms(),
            session_heartbeat_timeout_window_ms: default_heartbeat_timeout_ms(),
            processing_flow_cleanup_time_ms: default_cleanup_time_ms(),
            max_flow_retries: default_max_flow_retries(),
        }
    }
}

impl FlowEngineConfig {
    pub fn resend_window(&self) -> Duration {
        Duration::milliseconds(self.session_message_resend_window_ms as i64)
    }

    pub fn heartbeat_timeout_window(&self) -> Duration {
        Duration::milliseconds(self.session_heartbeat_timeout_window_ms as i64)
    }

    pub fn cleanup_time(&self) -> Duration {
        Duration::milliseconds(self.processing_flow_cleanup_time_ms as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = FlowEngineConfig::default();
        assert_eq!(config.session_message_resend_window_ms, 120_000);
        assert_eq!(config.session_heartbeat_timeout_window_ms, 500_000);
        assert_eq!(config.processing_flow_cleanup_time_ms, 600_000);
        assert_eq!(config.max_flow_retries, 5);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: FlowEngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.session_message_resend_window_ms, 120_000);
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
session_message_resend_window_ms = 5000
session_heartbeat_timeout_window_ms = 30000
processing_flow_cleanup_time_ms = 60000
max_flow_retries = 2
"#;
        let config: FlowEngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session_message_resend_window_ms, 5_000);
        assert_eq!(config.session_heartbeat_timeout_window_ms, 30_000);
        assert_eq!(config.processing_flow_cleanup_time_ms, 60_000);
        assert_eq!(config.max_flow_retries, 2);
    }

    #[test]
    fn test_duration_accessors() {
        let config = FlowEngineConfig::default();
        assert_eq!(config.resend_window(), Duration::milliseconds(120_000));
        assert_eq!(config.cleanup_time(), Duration::minutes(10));
    }
}
