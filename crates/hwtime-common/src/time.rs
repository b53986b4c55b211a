//! Tick and real-time-clock value types.
//!
//! One tick is one microsecond of the free-running hardware counter.
//! RTC fields are raw board register values; nothing here validates them
//! as a calendar.

use serde::{Deserialize, Serialize};

/// Ticks per millisecond of the hardware counter.
pub const TICKS_PER_MS: u64 = 1_000;

/// Width of the narrow hardware tick sample, in bits.
pub const TICK_LOW_BITS: u32 = 32;

/// Mask selecting the rollover count of an extended timestamp.
pub const TICK_HIGH_MASK: u64 = !(u32::MAX as u64);

/// Split an extended tick count into `(high, low)` 32-bit halves.
#[inline]
pub fn split_ticks(total: u64) -> (u32, u32) {
    (((total & TICK_HIGH_MASK) >> TICK_LOW_BITS) as u32, total as u32)
}

/// Join `(high, low)` 32-bit halves into an extended tick count.
#[inline]
pub fn join_ticks(high: u32, low: u32) -> u64 {
    (u64::from(high) << TICK_LOW_BITS) | u64::from(low)
}

/// RTC time-of-day registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcTime {
    /// Hours register.
    pub hours: u8,
    /// Minutes register.
    pub minutes: u8,
    /// Seconds register.
    pub seconds: u8,
    /// Sub-second register (read-only on the board).
    pub subseconds: u32,
}

/// RTC date registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcDate {
    /// Day of week register.
    pub weekday: u8,
    /// Day of month register.
    pub day: u8,
    /// Month register.
    pub month: u8,
    /// Two-digit year register.
    pub year: u8,
}

impl Default for RtcDate {
    fn default() -> Self {
        Self {
            weekday: 1,
            day: 1,
            month: 1,
            year: 0,
        }
    }
}
