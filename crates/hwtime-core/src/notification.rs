//! Hardware-backed timer notification slots.
//!
//! The pool is a fixed array of `N` notification records. Slot `i` is bound
//! to timer channel `i` of the [`TickSource`]; the slot index is the hardware
//! timer identifier, so `N` must not exceed the number of channels the
//! source provides.
//!
//! # Slot lifecycle
//!
//! ```text
//!            register                 fire (one-shot)
//!   Free ─────────────────► Armed ─────────────────────► Expired (free)
//!    ▲                      │  ▲                            │
//!    │      deregister      │  │ fire (repeating)           │ register
//!    └──────────────────────┘  └──┘                         ▼
//!                                                         Armed
//! ```
//!
//! An expired slot keeps its handler so [`NotificationPool::is_expired`] can
//! report it, but it is free for reuse and can no longer be deregistered.
//!
//! # Locking
//!
//! One mutex guards the slot table. Registration and deregistration first
//! probe per-slot atomics without the lock, then take the lock and re-check
//! before mutating. The dispatcher takes the same lock and invokes the
//! handler while holding it, so a successful [`NotificationPool::deregister`]
//! guarantees the handler is not running and will not run again.
//!
//! # Handler constraints
//!
//! Handlers run on the tick source's callback context with the pool locked.
//! They must not block, and must not call into any notification pool: every
//! pool operation takes a pool mutex, so two pools whose handlers called into
//! each other would deadlock. Such calls fail with
//! [`TimeError::ReentrantCall`] instead.

use crate::extender::extend_tick;
use crate::sync::lock;
use crate::tick_source::{TickSource, TimerCallback};
use crossbeam_utils::CachePadded;
use hwtime_common::error::{TimeError, TimeResult};
use hwtime_common::time::TICKS_PER_MS;
use static_assertions::const_assert;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace, warn};

/// Number of hardware timer channels on the reference board.
pub const DEFAULT_SLOT_COUNT: usize = 10;

const_assert!(DEFAULT_SLOT_COUNT > 0);

/// Opaque value handed back to a handler on every invocation.
pub type NotifyContext = u64;

/// Probe value of a slot that is not armed. Handler ids are heap addresses
/// and never zero.
const FREE: usize = 0;

thread_local! {
    /// Set while any pool is dispatching a handler on this thread.
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as dispatching until dropped.
struct DispatchScope {
    previous: bool,
}

impl DispatchScope {
    fn enter() -> Self {
        Self {
            previous: DISPATCHING.with(|d| d.replace(true)),
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

/// Notification callback, invoked as `handler(context, timestamp_us)`.
///
/// Handlers are compared by identity: clones of one `NotifyHandler` are
/// equal, two handlers built from identical closures are not.
#[derive(Clone)]
pub struct NotifyHandler(Arc<dyn Fn(NotifyContext, u64) + Send + Sync>);

impl NotifyHandler {
    /// Wrap a closure as a handler.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(NotifyContext, u64) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn call(&self, context: NotifyContext, timestamp_us: u64) {
        (self.0)(context, timestamp_us)
    }
}

impl PartialEq for NotifyHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for NotifyHandler {}

impl fmt::Debug for NotifyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotifyHandler({:#x})", self.id())
    }
}

/// One slot of the notification table.
#[derive(Debug, Clone)]
pub struct TimerNotification {
    handler: Option<NotifyHandler>,
    context: NotifyContext,
    expired: bool,
    repeat: bool,
    index: usize,
    /// Bumped on every registration; stale hardware callbacks carry an older value.
    generation: u64,
}

impl TimerNotification {
    fn new(index: usize) -> Self {
        Self {
            handler: None,
            context: 0,
            expired: false,
            repeat: false,
            index,
            generation: 0,
        }
    }

    /// Slot position, doubling as the hardware timer channel.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Handler of the current or most recently fired registration.
    pub fn handler(&self) -> Option<&NotifyHandler> {
        self.handler.as_ref()
    }

    /// Context of the current registration.
    pub fn context(&self) -> NotifyContext {
        self.context
    }

    /// Whether a one-shot notification has fired or the slot was deregistered.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Whether the notification re-fires until deregistered.
    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    /// Whether a hardware timer is currently registered for this slot.
    pub fn is_armed(&self) -> bool {
        self.handler.is_some() && !self.expired
    }

    fn holds(&self, handler: &NotifyHandler) -> bool {
        self.handler.as_ref() == Some(handler)
    }
}

struct PoolInner<S, const N: usize> {
    source: S,
    slots: Mutex<[TimerNotification; N]>,
    /// Handler id per armed slot, [`FREE`] otherwise.
    /// Written only under `slots`; read without it as a fast probe.
    probes: [CachePadded<AtomicUsize>; N],
}

impl<S: TickSource + 'static, const N: usize> PoolInner<S, N> {
    fn check_reentry(&self) -> TimeResult<()> {
        if DISPATCHING.with(Cell::get) {
            Err(TimeError::ReentrantCall)
        } else {
            Ok(())
        }
    }

    /// Hardware callback for a registration of `index` at `generation`.
    fn dispatcher(self: &Arc<Self>, index: usize, generation: u64) -> TimerCallback {
        let pool: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(pool) = pool.upgrade() {
                pool.dispatch(index, generation);
            }
        })
    }

    fn dispatch(self: &Arc<Self>, index: usize, generation: u64) {
        let mut slots = lock(&self.slots);
        let slot = &mut slots[index];

        if slot.generation != generation || !slot.is_armed() {
            trace!(slot = index, generation, "ignoring stale timer callback");
            return;
        }
        let Some(handler) = slot.handler.clone() else {
            return;
        };

        let timestamp_us = extend_tick(&self.source, self.source.current_ticks());
        debug!(
            slot = index,
            timestamp_us,
            repeat = slot.repeat,
            "dispatching timer notification"
        );
        {
            let _scope = DispatchScope::enter();
            handler.call(slot.context, timestamp_us);
        }

        if !slot.repeat {
            slot.expired = true;
            self.probes[index].store(FREE, Ordering::Release);
            if let Err(e) = self.source.disarm_timer(index) {
                warn!(slot = index, error = %e, "failed to disarm expired one-shot timer");
            }
        }
    }
}

/// Fixed-capacity pool of timer notifications driven by a [`TickSource`].
///
/// Dropping the pool disarms every armed slot.
pub struct NotificationPool<S: TickSource + 'static, const N: usize = DEFAULT_SLOT_COUNT> {
    inner: Arc<PoolInner<S, N>>,
}

impl<S: TickSource + 'static, const N: usize> fmt::Debug for NotificationPool<S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPool")
            .field("capacity", &N)
            .field("armed", &self.armed_count())
            .finish()
    }
}

impl<S: TickSource + 'static, const N: usize> NotificationPool<S, N> {
    /// Create a pool whose slots map onto the first `N` timer channels of `source`.
    pub fn new(source: S) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                source,
                slots: Mutex::new(std::array::from_fn(TimerNotification::new)),
                probes: std::array::from_fn(|_| CachePadded::new(AtomicUsize::new(FREE))),
            }),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        N
    }

    /// The tick source driving this pool.
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Number of armed slots.
    pub fn armed_count(&self) -> usize {
        lock(&self.inner.slots).iter().filter(|s| s.is_armed()).count()
    }

    /// Copy of slot `index`, if it exists.
    pub fn slot(&self, index: usize) -> Option<TimerNotification> {
        lock(&self.inner.slots).get(index).cloned()
    }

    /// Register `handler` to fire `delay_us` from now.
    ///
    /// The delay is truncated to whole milliseconds; anything under 1ms fires
    /// on the next hardware tick. A repeating notification re-fires every
    /// delay period until deregistered.
    ///
    /// Returns the slot index on success.
    ///
    /// # Errors
    ///
    /// - [`TimeError::NoFreeSlot`] if every slot is armed.
    /// - [`TimeError::DelayOutOfRange`] if the delay in milliseconds exceeds `u32::MAX`.
    /// - Any error from the tick source when arming; the slot stays free and
    ///   no other slot is tried.
    /// - [`TimeError::ReentrantCall`] when called from a notification handler.
    pub fn register_relative(
        &self,
        handler: &NotifyHandler,
        delay_us: u64,
        context: NotifyContext,
        repeat: bool,
    ) -> TimeResult<usize> {
        let inner = &self.inner;
        inner.check_reentry()?;

        let delay_ms = u32::try_from(delay_us / TICKS_PER_MS)
            .map_err(|_| TimeError::DelayOutOfRange { delay_us })?;

        for index in 0..N {
            if inner.probes[index].load(Ordering::Acquire) != FREE {
                continue;
            }

            let mut slots = lock(&inner.slots);
            let slot = &mut slots[index];
            if slot.is_armed() {
                continue;
            }

            slot.generation = slot.generation.wrapping_add(1);
            let callback = inner.dispatcher(index, slot.generation);
            if let Err(e) = inner.source.arm_timer(index, delay_ms, callback) {
                warn!(slot = index, delay_ms, error = %e, "tick source rejected timer");
                return Err(e);
            }

            slot.handler = Some(handler.clone());
            slot.context = context;
            slot.expired = false;
            slot.repeat = repeat;
            inner.probes[index].store(handler.id(), Ordering::Release);

            debug!(slot = index, delay_ms, repeat, "timer notification registered");
            return Ok(index);
        }

        debug!(capacity = N, "no free notification slot");
        Err(TimeError::NoFreeSlot { capacity: N })
    }

    /// Register a one-shot `handler` to fire at extended timestamp `trigger_us`.
    ///
    /// # Errors
    ///
    /// [`TimeError::TriggerInPast`] if `trigger_us` is not after the current
    /// extended timestamp, otherwise as [`Self::register_relative`].
    pub fn register_absolute(
        &self,
        handler: &NotifyHandler,
        trigger_us: u64,
        context: NotifyContext,
    ) -> TimeResult<usize> {
        self.inner.check_reentry()?;

        let now_us = self.inner.source.total_ticks();
        if trigger_us <= now_us {
            return Err(TimeError::TriggerInPast { trigger_us, now_us });
        }
        self.register_relative(handler, trigger_us - now_us, context, false)
    }

    /// Deregister the armed slot holding `handler`.
    ///
    /// On success the hardware timer is disarmed, the handler will not be
    /// invoked again, and the slot index is returned.
    ///
    /// # Errors
    ///
    /// - [`TimeError::NotRegistered`] if no armed slot holds `handler`; no
    ///   slot is modified.
    /// - Any error from the tick source when disarming; the slot stays armed.
    /// - [`TimeError::ReentrantCall`] when called from a notification handler.
    pub fn deregister(&self, handler: &NotifyHandler) -> TimeResult<usize> {
        let inner = &self.inner;
        inner.check_reentry()?;

        let id = handler.id();
        for index in 0..N {
            if inner.probes[index].load(Ordering::Acquire) != id {
                continue;
            }

            let mut slots = lock(&inner.slots);
            let slot = &mut slots[index];
            if !slot.is_armed() || !slot.holds(handler) {
                continue;
            }

            if let Err(e) = inner.source.disarm_timer(index) {
                warn!(slot = index, error = %e, "tick source refused to disarm timer");
                return Err(e);
            }

            slot.handler = None;
            slot.context = 0;
            slot.expired = true;
            slot.repeat = false;
            inner.probes[index].store(FREE, Ordering::Release);

            debug!(slot = index, "timer notification deregistered");
            return Ok(index);
        }

        Err(TimeError::NotRegistered)
    }

    /// Whether the notification registered with `handler` has expired.
    ///
    /// `Ok(false)` while armed (including repeating notifications that have
    /// fired), `Ok(true)` once a one-shot notification has fired.
    ///
    /// # Errors
    ///
    /// [`TimeError::NotRegistered`] if no slot holds `handler`, which includes
    /// handlers that were deregistered.
    pub fn is_expired(&self, handler: &NotifyHandler) -> TimeResult<bool> {
        self.inner.check_reentry()?;

        let slots = lock(&self.inner.slots);
        let mut found = None;
        for slot in slots.iter().filter(|s| s.holds(handler)) {
            if slot.is_armed() {
                return Ok(false);
            }
            found = Some(slot.expired);
        }
        found.ok_or(TimeError::NotRegistered)
    }

    /// Disarm every armed slot. Failures are logged and the slot left armed.
    fn disarm_all(&self) {
        let inner = &self.inner;
        if inner.check_reentry().is_err() {
            warn!("notification pool dropped from a handler; timers left armed");
            return;
        }

        let mut slots = lock(&inner.slots);
        for slot in slots.iter_mut().filter(|s| s.is_armed()) {
            match inner.source.disarm_timer(slot.index) {
                Ok(()) => {
                    slot.handler = None;
                    slot.expired = true;
                    slot.repeat = false;
                    inner.probes[slot.index].store(FREE, Ordering::Release);
                }
                Err(e) => {
                    warn!(slot = slot.index, error = %e, "failed to disarm timer on teardown");
                }
            }
        }
    }
}

impl<S: TickSource + 'static, const N: usize> Drop for NotificationPool<S, N> {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
