//! Configuration-driven bring-up tests.
//!
//! # Acceptance Criteria
//!
//! - A TOML file configures the starting counter, timer limits, and RTC registers
//! - Timer delays beyond the configured limit are rejected by the hardware
//! - Missing or invalid files are reported, not defaulted

use hwtime_common::config::{ConfigError, TimingConfig};
use hwtime_common::error::TimeError;
use hwtime_core::{NotifyHandler, SimulatedBoard, SimulatedTickSource, SystemClock};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[tick_source]
driver = "simulated"
initial_ticks = 4294960000
max_timer_delay = "2s"
pump_interval = "1ms"

[rtc.time]
hours = 6
minutes = 45
seconds = 30

[rtc.date]
weekday = 5
day = 24
month = 12
year = 26

[daemon]
run_time = "3s"
report_interval = "250ms"
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_bring_up_from_file() {
    let file = write_config(CONFIG);
    let config = TimingConfig::from_file(file.path()).unwrap();
    assert_eq!(config.daemon.report_interval, Duration::from_millis(250));

    let source = Arc::new(SimulatedTickSource::from_config(&config.tick_source, 4));
    let clock: SystemClock<_, _, 4> =
        SystemClock::new(Arc::clone(&source), SimulatedBoard::from_config(&config.rtc));

    assert_eq!(clock.total_microseconds(), 4_294_960_000);
    assert_eq!(clock.microseconds_high_portion(), 0);

    let time = clock.rtc_time().unwrap();
    assert_eq!((time.hours, time.minutes, time.seconds), (6, 45, 30));
    let date = clock.rtc_date().unwrap();
    assert_eq!((date.weekday, date.day, date.month, date.year), (5, 24, 12, 26));

    let handler = NotifyHandler::new(|_, _| {});
    assert!(matches!(
        clock.register_timer_notification_relative(&handler, 2_001_000, 0, false),
        Err(TimeError::ArmRejected { .. })
    ));
    assert_eq!(
        clock.register_timer_notification_relative(&handler, 2_000_000, 0, false),
        Ok(0)
    );

    source.advance(2_000_000);
    assert_eq!(clock.is_timer_notification_expired(&handler), Ok(true));
    assert_eq!(clock.microseconds_high_portion(), 1);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TimingConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got {err}");
}

#[test]
fn test_invalid_delay_limit_rejected() {
    let file = write_config(
        r#"
        [tick_source]
        max_timer_delay = "500us"
        "#,
    );
    let err = TimingConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err}");
}
