//! Integration tests for hwtime acceptance testing.
//!
//! These tests verify:
//! - Timestamp extension across 32-bit rollovers
//! - Notification pool churn over long simulated runs
//! - Configuration-driven bring-up

mod common;
mod config_test;
mod rollover_test;
mod soak_test;
