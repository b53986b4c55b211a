//! Extension of 32-bit tick samples to 64-bit timestamps.
//!
//! A tick sample captured from the low half of the hardware counter is
//! widened with the rollover count of the live extended counter. If the low
//! half has wrapped since the sample was taken, the live rollover count is
//! one ahead of the sample's and is stepped back by one.
//!
//! # Constraint
//!
//! Exactly one wrap between capture and extension is corrected. A sample
//! older than one full wrap period (2^32 us, about 71.6 minutes) extends to
//! a timestamp one or more wrap periods too late. Callers must extend samples
//! well within that window.

use crate::tick_source::TickSource;
use hwtime_common::time::{join_ticks, split_ticks};
use tracing::trace;

/// Extend `tick` against an extended counter value `now`.
///
/// Pure form of [`extend_tick`], for callers that already hold a counter
/// reading.
///
/// If the counter is still in its first wrap period and its low half is
/// below `tick`, the sample cannot have come from this counter; the rollover
/// count saturates at zero and `tick` is returned unchanged.
#[inline]
pub fn extend_tick_at(now: u64, tick: u32) -> u64 {
    let (high, low) = split_ticks(now);
    let high = if low < tick { high.saturating_sub(1) } else { high };
    join_ticks(high, tick)
}

/// Extend a tick sample to a 64-bit timestamp consistent with the source's
/// own extended counter at the moment of the call.
pub fn extend_tick<S: TickSource + ?Sized>(source: &S, tick: u32) -> u64 {
    let now = source.total_ticks();
    let extended = extend_tick_at(now, tick);
    trace!(tick, now, extended, "extended tick sample");
    extended
}
