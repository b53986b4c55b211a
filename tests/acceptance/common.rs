//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Building a clock on the simulated tick source and board
//! - Recording notification deliveries

#![allow(dead_code)] // Not every helper is used by every test file

use hwtime_core::{NotifyHandler, SimulatedBoard, SimulatedTickSource, SystemClock};
use std::sync::{Arc, Mutex};

/// Clock type used throughout the acceptance tests.
pub type TestClock<const N: usize> = SystemClock<SimulatedTickSource, Arc<SimulatedBoard>, N>;

/// Simulated hardware plus the clock built on it.
pub struct Rig<const N: usize> {
    /// Tick source driving the clock.
    pub source: Arc<SimulatedTickSource>,
    /// Board holding the RTC registers.
    pub board: Arc<SimulatedBoard>,
    /// Clock under test.
    pub clock: TestClock<N>,
}

impl<const N: usize> Rig<N> {
    /// Build a rig starting at `ticks`.
    pub fn at(ticks: u64) -> Self {
        let source = Arc::new(SimulatedTickSource::with_ticks(N, ticks));
        let board = Arc::new(SimulatedBoard::new());
        let clock = SystemClock::new(Arc::clone(&source), Arc::clone(&board));
        Self {
            source,
            board,
            clock,
        }
    }
}

/// One notification delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Context the handler was registered with.
    pub context: u64,
    /// Extended timestamp passed to the handler.
    pub timestamp_us: u64,
}

/// Shared log of deliveries.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    entries: Arc<Mutex<Vec<Delivery>>>,
}

impl DeliveryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler appending to this log.
    pub fn handler(&self) -> NotifyHandler {
        let entries = Arc::clone(&self.entries);
        NotifyHandler::new(move |context, timestamp_us| {
            entries.lock().unwrap().push(Delivery {
                context,
                timestamp_us,
            });
        })
    }

    /// Copy of all deliveries so far.
    pub fn entries(&self) -> Vec<Delivery> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of deliveries so far.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Deliveries with the given context.
    pub fn for_context(&self, context: u64) -> Vec<Delivery> {
        self.entries()
            .into_iter()
            .filter(|d| d.context == context)
            .collect()
    }
}
