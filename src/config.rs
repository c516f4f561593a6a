use std::time::Duration;

use crate::error::SessionError;
use crate::transport::HandleConfig;

pub const DEFAULT_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_INTERVAL_MS: u64 = 25;
pub const DEFAULT_COUNT: u32 = 5;
pub const DEFAULT_CHART_COLOR: &str = "#ff0000";
/// Upper bound for both the timeout and the interval: one day.
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// Settings for a continuous probing session.
///
/// `chart_color` is only read by renderers; the session carries it along
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub target: String,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub chart_color: String,
}

impl SessionConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
            chart_color: DEFAULT_CHART_COLOR.to_string(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_chart_color(mut self, color: impl Into<String>) -> Self {
        self.chart_color = color.into();
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        validate_probe_params(&self.target, self.timeout_ms, self.interval_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn handle_config(&self) -> HandleConfig {
        HandleConfig::with_timeout(self.timeout_ms)
    }
}

/// Settings for a fixed-count batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub target: String,
    pub count: u32,
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

impl BatchConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            count: DEFAULT_COUNT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.count == 0 {
            return Err(SessionError::invalid("count must be greater than 0"));
        }
        validate_probe_params(&self.target, self.timeout_ms, self.interval_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn handle_config(&self) -> HandleConfig {
        HandleConfig::with_timeout(self.timeout_ms)
    }
}

fn validate_probe_params(target: &str, timeout_ms: u64, interval_ms: u64) -> Result<(), SessionError> {
    if target.trim().is_empty() {
        return Err(SessionError::invalid("target address is not set"));
    }
    if timeout_ms == 0 {
        return Err(SessionError::invalid("timeout must be greater than 0"));
    }
    if interval_ms == 0 {
        return Err(SessionError::invalid("interval must be greater than 0"));
    }
    if timeout_ms > MAX_DURATION_MS || interval_ms > MAX_DURATION_MS {
        return Err(SessionError::invalid(format!(
            "timeout and interval must not exceed {}ms",
            MAX_DURATION_MS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::new("10.0.0.1");
        assert_eq!(cfg.timeout_ms, 500);
        assert_eq!(cfg.interval_ms, 25);
        assert_eq!(cfg.chart_color, "#ff0000");

        let batch = BatchConfig::new("10.0.0.1");
        assert_eq!(batch.count, 5);
        assert_eq!(batch.timeout_ms, 500);
        assert_eq!(batch.interval_ms, 25);
    }

    #[test]
    fn test_parameter_validation() {
        assert!(SessionConfig::new("10.0.0.1").validate().is_ok());

        // Missing target
        assert!(SessionConfig::new("").validate().unwrap_err().is_invalid_configuration());
        assert!(SessionConfig::new("   ").validate().is_err());

        // Zero timeout and interval
        assert!(SessionConfig::new("10.0.0.1").with_timeout_ms(0).validate().is_err());
        assert!(SessionConfig::new("10.0.0.1").with_interval_ms(0).validate().is_err());

        // Batch count
        assert!(BatchConfig::new("10.0.0.1").with_count(0).validate().is_err());
        assert!(BatchConfig::new("").validate().is_err());
        assert!(BatchConfig::new("10.0.0.1").with_count(1).validate().is_ok());
    }

    #[test]
    fn test_upper_bound() {
        let at_limit = SessionConfig::new("10.0.0.1")
            .with_timeout_ms(MAX_DURATION_MS)
            .with_interval_ms(MAX_DURATION_MS);
        assert!(at_limit.validate().is_ok());

        assert!(SessionConfig::new("10.0.0.1").with_interval_ms(MAX_DURATION_MS + 1).validate().is_err());
        assert!(SessionConfig::new("10.0.0.1").with_timeout_ms(u64::MAX).validate().is_err());
        let err = BatchConfig::new("10.0.0.1")
            .with_count(1002)
            .with_interval_ms(u64::MAX)
            .validate()
            .unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn test_handle_config_carries_timeout() {
        let handle = SessionConfig::new("10.0.0.1").with_timeout_ms(750).handle_config();
        assert_eq!(handle.timeout_ms, 750);
        assert_eq!(handle.packet_size, 16);
        assert_eq!(handle.retries, 1);
    }
}
