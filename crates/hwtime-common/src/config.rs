//! Configuration structures for the timing core.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for deployment.

use crate::time::{RtcDate, RtcTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level timing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Tick source configuration.
    pub tick_source: TickSourceConfig,

    /// Initial board RTC registers (simulated board only).
    pub rtc: RtcConfig,

    /// Daemon run parameters.
    pub daemon: DaemonConfig,
}

/// Supported tick source drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TickSourceDriver {
    /// In-memory counter advanced from the host monotonic clock.
    #[default]
    Simulated,
}

/// Tick source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickSourceConfig {
    /// Tick source driver type.
    pub driver: TickSourceDriver,

    /// Starting 64-bit tick count.
    /// Set close to a multiple of 2^32 to exercise the rollover path early.
    pub initial_ticks: u64,

    /// Longest delay the hardware will accept when arming a timer.
    #[serde(with = "humantime_serde")]
    pub max_timer_delay: Duration,

    /// How often the simulated counter is advanced from the host clock.
    #[serde(with = "humantime_serde")]
    pub pump_interval: Duration,
}

impl Default for TickSourceConfig {
    fn default() -> Self {
        Self {
            driver: TickSourceDriver::Simulated,
            initial_ticks: 0,
            max_timer_delay: Duration::from_secs(60),
            pump_interval: Duration::from_millis(1),
        }
    }
}

/// Initial RTC register values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Time-of-day registers.
    pub time: RtcTime,
    /// Date registers.
    pub date: RtcDate,
}

/// Daemon run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Total run time before the daemon exits.
    #[serde(with = "humantime_serde")]
    pub run_time: Duration,

    /// Period of the repeating status notification.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            run_time: Duration::from_secs(5),
            report_interval: Duration::from_millis(500),
        }
    }
}

impl TimingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the values are inconsistent.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ts = &self.tick_source;
        if ts.pump_interval.is_zero() {
            return Err(ConfigError::Invalid("tick_source.pump_interval must be non-zero".into()));
        }
        if ts.max_timer_delay < Duration::from_millis(1) {
            return Err(ConfigError::Invalid(
                "tick_source.max_timer_delay must be at least 1ms".into(),
            ));
        }
        if u32::try_from(ts.max_timer_delay.as_millis()).is_err() {
            return Err(ConfigError::Invalid(
                "tick_source.max_timer_delay does not fit a 32-bit millisecond count".into(),
            ));
        }
        if self.daemon.report_interval < Duration::from_millis(1) {
            return Err(ConfigError::Invalid(
                "daemon.report_interval must be at least 1ms".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Value out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TimingConfig::default();
        assert_eq!(config.tick_source.driver, TickSourceDriver::Simulated);
        assert_eq!(config.tick_source.max_timer_delay, Duration::from_secs(60));
        assert_eq!(config.tick_source.pump_interval, Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [tick_source]
            driver = "simulated"
            initial_ticks = 4294967000
            max_timer_delay = "10s"
            pump_interval = "2ms"

            [rtc.time]
            hours = 12
            minutes = 30

            [rtc.date]
            weekday = 3
            day = 14
            month = 6
            year = 24

            [daemon]
            run_time = "1s"
            report_interval = "100ms"
        "#;

        let config = TimingConfig::from_toml(toml).unwrap();
        assert_eq!(config.tick_source.initial_ticks, 4_294_967_000);
        assert_eq!(config.tick_source.max_timer_delay, Duration::from_secs(10));
        assert_eq!(config.tick_source.pump_interval, Duration::from_millis(2));
        assert_eq!(config.rtc.time.hours, 12);
        assert_eq!(config.rtc.time.seconds, 0);
        assert_eq!(config.rtc.date.year, 24);
        assert_eq!(config.daemon.report_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = TimingConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed = TimingConfig::from_toml(&toml).unwrap();
        assert_eq!(config.tick_source.pump_interval, parsed.tick_source.pump_interval);
        assert_eq!(config.daemon.run_time, parsed.daemon.run_time);
    }

    #[test]
    fn test_reject_zero_pump_interval() {
        let toml = r#"
            [tick_source]
            pump_interval = "0s"
        "#;
        let err = TimingConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err}");
    }

    #[test]
    fn test_reject_unknown_driver() {
        let toml = r#"
            [tick_source]
            driver = "pigpio"
        "#;
        assert!(matches!(
            TimingConfig::from_toml(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rtc_fields_partial_json() {
        let time: RtcTime = serde_json::from_str(r#"{"hours": 7}"#).unwrap();
        assert_eq!(time.hours, 7);
        assert_eq!(time.minutes, 0);
    }
}
