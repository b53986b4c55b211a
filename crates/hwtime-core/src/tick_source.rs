//! Hardware tick source abstraction.
//!
//! The tick source owns the free-running microsecond counter and a small
//! table of millisecond-granularity hardware timer channels. The timing core
//! never touches hardware directly; it goes through [`TickSource`].
//!
//! [`SimulatedTickSource`] implements the trait in memory so the rest of the
//! core can run without a board attached. Its counter only moves when
//! [`SimulatedTickSource::advance`] is called, either by tests or by a
//! [`TickPump`] thread that follows the host clock.

use crate::sync::lock;
use hwtime_common::config::TickSourceConfig;
use hwtime_common::error::{TimeError, TimeResult};
use hwtime_common::time::{split_ticks, TICKS_PER_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Callback installed on a hardware timer channel.
///
/// Any per-registration context is captured by the closure.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Free-running hardware counter with periodic timer channels.
///
/// Timer channels are periodic: once armed, a channel fires every
/// `delay_ms` until it is disarmed. Callbacks may run on a context distinct
/// from the caller's thread and must be safe to call concurrently with
/// [`TickSource::arm_timer`] and [`TickSource::disarm_timer`].
pub trait TickSource: Send + Sync {
    /// Low 32 bits of the counter.
    fn current_ticks(&self) -> u32;

    /// Full 64-bit counter, extended across 32-bit rollovers.
    fn total_ticks(&self) -> u64;

    /// High 32 bits of the extended counter.
    fn high_ticks(&self) -> u32 {
        split_ticks(self.total_ticks()).0
    }

    /// Arm timer channel `slot` to invoke `callback` every `delay_ms`.
    ///
    /// Arming an already armed channel replaces its callback and period.
    fn arm_timer(&self, slot: usize, delay_ms: u32, callback: TimerCallback) -> TimeResult<()>;

    /// Disarm timer channel `slot`.
    fn disarm_timer(&self, slot: usize) -> TimeResult<()>;
}

impl<T: TickSource + ?Sized> TickSource for Arc<T> {
    fn current_ticks(&self) -> u32 {
        (**self).current_ticks()
    }

    fn total_ticks(&self) -> u64 {
        (**self).total_ticks()
    }

    fn high_ticks(&self) -> u32 {
        (**self).high_ticks()
    }

    fn arm_timer(&self, slot: usize, delay_ms: u32, callback: TimerCallback) -> TimeResult<()> {
        (**self).arm_timer(slot, delay_ms, callback)
    }

    fn disarm_timer(&self, slot: usize) -> TimeResult<()> {
        (**self).disarm_timer(slot)
    }
}

/// Armed channel of the simulated source.
struct SimTimer {
    period_us: u64,
    next_due: u64,
    callback: TimerCallback,
}

struct SimState {
    ticks: u64,
    channels: Vec<Option<SimTimer>>,
}

/// In-memory tick source for tests and board-less runs.
pub struct SimulatedTickSource {
    state: Mutex<SimState>,
    /// Serializes `advance` callers so fire order follows deadlines.
    advance_lock: Mutex<()>,
    max_delay_ms: u32,
    available: AtomicBool,
    reject_arm: AtomicBool,
    reject_disarm: AtomicBool,
}

impl std::fmt::Debug for SimulatedTickSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("SimulatedTickSource")
            .field("ticks", &state.ticks)
            .field("channels", &state.channels.len())
            .field("armed", &state.channels.iter().filter(|c| c.is_some()).count())
            .field("max_delay_ms", &self.max_delay_ms)
            .finish()
    }
}

impl SimulatedTickSource {
    /// Create a source with `channels` timer channels, starting at tick 0.
    pub fn new(channels: usize) -> Self {
        Self::with_ticks(channels, 0)
    }

    /// Create a source starting at the given 64-bit tick count.
    pub fn with_ticks(channels: usize, ticks: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                ticks,
                channels: (0..channels).map(|_| None).collect(),
            }),
            advance_lock: Mutex::new(()),
            max_delay_ms: 60_000,
            available: AtomicBool::new(true),
            reject_arm: AtomicBool::new(false),
            reject_disarm: AtomicBool::new(false),
        }
    }

    /// Create a source from configuration.
    pub fn from_config(config: &TickSourceConfig, channels: usize) -> Self {
        let mut source = Self::with_ticks(channels, config.initial_ticks);
        source.max_delay_ms = u32::try_from(config.max_timer_delay.as_millis()).unwrap_or(u32::MAX);
        source
    }

    /// Jump the counter to `ticks` without firing any timer.
    ///
    /// Deadlines of armed channels are left untouched.
    pub fn set_ticks(&self, ticks: u64) {
        lock(&self.state).ticks = ticks;
    }

    /// Simulate the hardware client going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Make every subsequent `arm_timer` fail.
    pub fn set_arm_rejection(&self, reject: bool) {
        self.reject_arm.store(reject, Ordering::Release);
    }

    /// Make every subsequent `disarm_timer` fail.
    pub fn set_disarm_rejection(&self, reject: bool) {
        self.reject_disarm.store(reject, Ordering::Release);
    }

    /// Whether channel `slot` currently has a timer armed.
    pub fn is_armed(&self, slot: usize) -> bool {
        lock(&self.state)
            .channels
            .get(slot)
            .is_some_and(|c| c.is_some())
    }

    /// Number of armed channels.
    pub fn armed_channels(&self) -> usize {
        lock(&self.state).channels.iter().filter(|c| c.is_some()).count()
    }

    /// Advance the counter by `us` ticks, firing due timers in deadline order.
    ///
    /// The counter reads as each timer's deadline while its callback runs.
    /// Callbacks run on the calling thread with no internal lock held.
    /// Returns the number of callbacks invoked.
    pub fn advance(&self, us: u64) -> usize {
        let _serial = lock(&self.advance_lock);
        let target = lock(&self.state).ticks.saturating_add(us);
        let mut fired = 0;

        loop {
            let callback = {
                let mut guard = lock(&self.state);
                let state = &mut *guard;
                let next = state
                    .channels
                    .iter_mut()
                    .enumerate()
                    .filter_map(|(i, c)| c.as_mut().map(|t| (i, t)))
                    .filter(|(_, t)| t.next_due <= target)
                    .min_by_key(|(i, t)| (t.next_due, *i));

                let Some((slot, timer)) = next else {
                    state.ticks = state.ticks.max(target);
                    break;
                };

                let due = timer.next_due;
                timer.next_due = due.saturating_add(timer.period_us);
                state.ticks = state.ticks.max(due);
                trace!(slot, due, "simulated timer fired");
                Arc::clone(&timer.callback)
            };

            callback();
            fired += 1;
        }

        fired
    }

    /// Spawn a thread that advances this source by real elapsed time.
    pub fn spawn_pump(self: &Arc<Self>, interval: Duration) -> TimeResult<TickPump> {
        TickPump::start(Arc::clone(self), interval)
    }

    fn check_available(&self) -> TimeResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TimeError::TickSourceUnavailable(
                "simulated tick source offline".into(),
            ))
        }
    }
}

impl TickSource for SimulatedTickSource {
    fn current_ticks(&self) -> u32 {
        lock(&self.state).ticks as u32
    }

    fn total_ticks(&self) -> u64 {
        lock(&self.state).ticks
    }

    fn arm_timer(&self, slot: usize, delay_ms: u32, callback: TimerCallback) -> TimeResult<()> {
        self.check_available()?;
        if self.reject_arm.load(Ordering::Acquire) {
            return Err(TimeError::ArmRejected {
                slot,
                reason: "arming disabled".into(),
            });
        }
        if delay_ms > self.max_delay_ms {
            return Err(TimeError::ArmRejected {
                slot,
                reason: format!("delay {delay_ms}ms exceeds {}ms", self.max_delay_ms),
            });
        }

        let mut state = lock(&self.state);
        let now = state.ticks;
        let channel = state.channels.get_mut(slot).ok_or_else(|| TimeError::ArmRejected {
            slot,
            reason: "no such timer channel".into(),
        })?;

        let delay_us = u64::from(delay_ms) * TICKS_PER_MS;
        *channel = Some(SimTimer {
            period_us: delay_us.max(TICKS_PER_MS),
            next_due: now.saturating_add(delay_us),
            callback,
        });
        trace!(slot, delay_ms, now, "simulated timer armed");
        Ok(())
    }

    fn disarm_timer(&self, slot: usize) -> TimeResult<()> {
        self.check_available()?;
        if self.reject_disarm.load(Ordering::Acquire) {
            return Err(TimeError::DisarmRejected {
                slot,
                reason: "disarming disabled".into(),
            });
        }

        let mut state = lock(&self.state);
        let channel = state
            .channels
            .get_mut(slot)
            .ok_or_else(|| TimeError::DisarmRejected {
                slot,
                reason: "no such timer channel".into(),
            })?;
        *channel = None;
        trace!(slot, "simulated timer disarmed");
        Ok(())
    }
}

/// Without its pump thread the simulated counter never moves.
fn pump_spawn_error(e: &std::io::Error) -> TimeError {
    warn!(error = %e, "Failed to spawn tick pump thread");
    TimeError::TickSourceUnavailable(format!("tick pump thread: {e}"))
}

/// Shared state between a [`TickPump`] handle and its thread.
#[derive(Debug)]
struct PumpState {
    stop_requested: AtomicBool,
    running: AtomicBool,
}

/// Background thread that drives a [`SimulatedTickSource`] from the host clock.
///
/// Dropping the pump stops and joins the thread.
#[derive(Debug)]
pub struct TickPump {
    state: Arc<PumpState>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl TickPump {
    fn start(source: Arc<SimulatedTickSource>, interval: Duration) -> TimeResult<Self> {
        if interval.is_zero() {
            return Err(TimeError::Config("tick pump interval must be non-zero".into()));
        }

        info!(interval_us = interval.as_micros() as u64, "Starting tick pump");

        let state = Arc::new(PumpState {
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("hwtime-tick-pump".into())
            .spawn(move || {
                debug!("Tick pump thread started");
                let start = Instant::now();
                let mut consumed_us: u64 = 0;

                while !thread_state.stop_requested.load(Ordering::Acquire) {
                    thread::sleep(interval);

                    let elapsed_us = start.elapsed().as_micros() as u64;
                    let delta = elapsed_us.saturating_sub(consumed_us);
                    consumed_us = elapsed_us;
                    source.advance(delta);
                }

                thread_state.running.store(false, Ordering::Release);
                debug!("Tick pump thread stopped");
            })
            .map_err(|e| {
                state.running.store(false, Ordering::Release);
                pump_spawn_error(&e)
            })?;

        Ok(Self {
            state,
            handle: Some(handle),
            interval,
        })
    }

    /// Check if the pump thread is running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Pump period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the pump thread and wait for it to exit.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        info!("Stopping tick pump");
        self.state.stop_requested.store(true, Ordering::Release);
        if let Err(e) = handle.join() {
            warn!("Tick pump thread panicked: {:?}", e);
        }
    }
}

impl Drop for TickPump {
    fn drop(&mut self) {
        self.stop();
    }
}
