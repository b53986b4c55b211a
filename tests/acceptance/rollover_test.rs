//! Timestamp extension acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A sample extends to `high << 32 | sample` when the live low half has not wrapped
//! - A sample extends to `(high - 1) << 32 | sample` when it has
//! - Pre-wrap samples extend strictly below post-wrap samples
//! - Notification timestamps stay monotonic across every rollover

use super::common::{DeliveryLog, Rig};
use hwtime_core::extend_tick_at;
use proptest::prelude::*;

const WRAP: u64 = 1 << 32;

proptest! {
    #[test]
    fn test_extension_matches_counter_halves(high in 1u32.., low: u32, tick: u32) {
        let now = (u64::from(high) << 32) | u64::from(low);

        let expected = if low >= tick {
            (u64::from(high) << 32) + u64::from(tick)
        } else {
            (u64::from(high - 1) << 32) + u64::from(tick)
        };
        prop_assert_eq!(extend_tick_at(now, tick), expected, "now={:#x} tick={:#x}", now, tick);
    }

    #[test]
    fn test_pre_wrap_sample_orders_before_post_wrap_sample(
        wraps in 1u64..=1_000,
        before_gap in 1u64..=1_000_000,
        after_gap in 0u64..1_000_000,
    ) {
        let boundary = wraps * WRAP;
        let pre_sample = (boundary - before_gap) as u32;
        let now = boundary + after_gap;

        let pre = extend_tick_at(now, pre_sample);
        let post = extend_tick_at(now, now as u32);
        prop_assert_eq!(pre, boundary - before_gap);
        prop_assert_eq!(post, now);
        prop_assert!(pre < post);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_sampled_frames_extend_to_capture_time(
        delays in prop::collection::vec(0u64..400, 500),
    ) {
        let rig: Rig<2> = Rig::at(WRAP - 20_000);

        for delay in delays {
            let captured_at = rig.clock.total_microseconds();
            let sample = rig.clock.current_microseconds();

            // Frames are processed a little later; the counter may wrap meanwhile.
            rig.source.advance(delay);

            prop_assert_eq!(rig.clock.total_system_time_of_tick(sample), captured_at);
        }
    }
}

#[test]
fn test_repeating_notification_across_several_wraps() {
    let rig: Rig<2> = Rig::at(0);
    let log = DeliveryLog::new();
    let handler = log.handler();

    for wrap in 1..=3u64 {
        let boundary = wrap * WRAP;
        rig.source.set_ticks(boundary - 2_500);
        rig.clock
            .register_timer_notification_relative(&handler, 1_000, wrap, true)
            .unwrap();
        rig.source.advance(5_000);
        rig.clock.deregister_timer_notification(&handler).unwrap();

        let stamps: Vec<u64> = log
            .for_context(wrap)
            .iter()
            .map(|d| d.timestamp_us)
            .collect();
        assert_eq!(stamps.len(), 5, "wrap {wrap}: {stamps:x?}");
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stamps[0] < boundary && *stamps.last().unwrap() > boundary);
    }

    let all: Vec<u64> = log.entries().iter().map(|d| d.timestamp_us).collect();
    assert!(all.windows(2).all(|w| w[0] < w[1]));
}
