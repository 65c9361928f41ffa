//! Session agent configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for proactive refresh.
///
/// ```toml
/// refresh_threshold = "10m"
/// max_retries = 2
/// retry_delay = "1s"
/// attempt_timeout = "10s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Refresh once the short-lived credential has this much time left.
    #[serde(with = "humantime_serde")]
    pub refresh_threshold: Duration,

    /// Retries after the first failed attempt. Only transient failures
    /// are retried.
    pub max_retries: u32,

    /// Fixed delay between attempts.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Upper bound for a single refresh attempt.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(10 * 60),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.refresh_threshold, Duration::from_secs(600));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"refresh_threshold": "5m", "max_retries": 4}"#).unwrap();
        assert_eq!(config.refresh_threshold, Duration::from_secs(300));
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.attempt_timeout, Duration::from_secs(10));
    }
}
