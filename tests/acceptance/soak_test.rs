//! Notification pool soak tests.
//!
//! Drives a full-size pool through a long pseudo-random sequence of
//! registrations, deregistrations, queries and clock advances that crosses
//! a 32-bit rollover.
//!
//! # Acceptance Criteria
//!
//! - Armed slots and armed hardware channels always agree
//! - Registration fails with `NoFreeSlot` exactly when every slot is armed
//! - One-shot notifications fire at most once and report expired after firing
//! - Repeating notifications never fire after deregistration
//! - Delivered timestamps never move backwards

use super::common::{DeliveryLog, Rig};
use hwtime_common::error::TimeError;
use hwtime_core::{NotifyHandler, DEFAULT_SLOT_COUNT};
use std::collections::HashMap;

const STEPS: usize = 20_000;

struct Live {
    handler: NotifyHandler,
    context: u64,
    repeat: bool,
}

#[test]
fn test_pool_churn_across_rollover() {
    let rig: Rig<DEFAULT_SLOT_COUNT> = Rig::at((1 << 32) - 5_000_000);
    let pool = rig.clock.notifications();
    let log = DeliveryLog::new();
    let mut rng = fastrand::Rng::with_seed(0xC0FFEE);

    let mut live: Vec<Live> = Vec::new();
    let mut one_shots: Vec<u64> = Vec::new();
    let mut deregistered_at: HashMap<u64, usize> = HashMap::new();
    let mut next_context = 0u64;

    for _ in 0..STEPS {
        // Retire one-shots that have fired.
        live.retain(|l| l.repeat || pool.is_expired(&l.handler) == Ok(false));

        match rng.u32(..10) {
            0..=3 => {
                let repeat = rng.u32(..3) == 0;
                let delay_us = rng.u64(..20_000);
                let handler = log.handler();
                let context = next_context;
                next_context += 1;

                let full = pool.armed_count() == pool.capacity();
                let result = rig
                    .clock
                    .register_timer_notification_relative(&handler, delay_us, context, repeat);
                if full {
                    assert_eq!(result, Err(TimeError::NoFreeSlot { capacity: DEFAULT_SLOT_COUNT }));
                } else {
                    assert!(result.is_ok(), "register failed with free slots: {result:?}");
                    if !repeat {
                        one_shots.push(context);
                    }
                    live.push(Live {
                        handler,
                        context,
                        repeat,
                    });
                }
            }
            4..=5 if !live.is_empty() => {
                let victim = live.swap_remove(rng.usize(..live.len()));
                assert!(rig.clock.deregister_timer_notification(&victim.handler).is_ok());
                assert_eq!(
                    pool.is_expired(&victim.handler),
                    Err(TimeError::NotRegistered)
                );
                deregistered_at.insert(victim.context, log.for_context(victim.context).len());
            }
            _ => {
                rig.source.advance(rng.u64(..3_000));
            }
        }

        assert_eq!(pool.armed_count(), rig.source.armed_channels());
        assert!(pool.armed_count() <= pool.capacity());
    }

    for l in live.drain(..) {
        if l.repeat || pool.is_expired(&l.handler) == Ok(false) {
            rig.clock.deregister_timer_notification(&l.handler).unwrap();
            deregistered_at.insert(l.context, log.for_context(l.context).len());
        }
    }
    rig.source.advance(100_000);

    assert_eq!(pool.armed_count(), 0);
    assert_eq!(rig.source.armed_channels(), 0);
    assert!(rig.clock.microseconds_high_portion() >= 1);

    for context in &one_shots {
        assert!(log.for_context(*context).len() <= 1, "one-shot {context} fired twice");
    }
    for (context, count) in &deregistered_at {
        assert_eq!(
            log.for_context(*context).len(),
            *count,
            "context {context} fired after deregistration"
        );
    }

    let stamps: Vec<u64> = log.entries().iter().map(|d| d.timestamp_us).collect();
    assert!(!stamps.is_empty());
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_teardown_disarms_full_pool() {
    let rig: Rig<DEFAULT_SLOT_COUNT> = Rig::at(0);
    let log = DeliveryLog::new();

    for i in 0..DEFAULT_SLOT_COUNT as u64 {
        rig.clock
            .register_timer_notification_relative(&log.handler(), 1_000 * (i + 1), i, i % 2 == 0)
            .unwrap();
    }
    assert_eq!(rig.source.armed_channels(), DEFAULT_SLOT_COUNT);

    let Rig { source, clock, .. } = rig;
    drop(clock);
    assert_eq!(source.armed_channels(), 0);

    source.advance(1_000_000);
    assert_eq!(log.len(), 0);
}
