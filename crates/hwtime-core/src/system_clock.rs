//! Timing facade for driver code.
//!
//! [`SystemClock`] bundles the tick source, the notification pool and the
//! RTC behind one handle. It is what collaborators such as message
//! timestamping streams hold on to.

use crate::extender::extend_tick;
use crate::notification::{NotificationPool, NotifyContext, NotifyHandler, DEFAULT_SLOT_COUNT};
use crate::os_clock;
use crate::rtc::{BoardClient, Rtc};
use crate::tick_source::TickSource;
use hwtime_common::error::TimeResult;
use hwtime_common::time::{RtcDate, RtcTime};
use std::sync::Arc;
use tracing::info;

/// Hardware clock, timer notifications and RTC of one board.
///
/// Dropping the clock disarms every outstanding notification.
#[derive(Debug)]
pub struct SystemClock<S, B, const N: usize = DEFAULT_SLOT_COUNT>
where
    S: TickSource + 'static,
    B: BoardClient,
{
    source: Arc<S>,
    notifications: NotificationPool<Arc<S>, N>,
    rtc: Rtc<B>,
}

impl<S, B, const N: usize> SystemClock<S, B, N>
where
    S: TickSource + 'static,
    B: BoardClient,
{
    /// Build the clock over a tick source and a board client.
    pub fn new(source: Arc<S>, board: B) -> Self {
        info!(slots = N, "Timing core initialized");
        Self {
            notifications: NotificationPool::new(Arc::clone(&source)),
            source,
            rtc: Rtc::new(board),
        }
    }

    /// The tick source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The notification pool.
    pub fn notifications(&self) -> &NotificationPool<Arc<S>, N> {
        &self.notifications
    }

    /// The RTC accessors.
    pub fn rtc(&self) -> &Rtc<B> {
        &self.rtc
    }

    /// Low 32 bits of the hardware microsecond counter.
    pub fn current_microseconds(&self) -> u32 {
        self.source.current_ticks()
    }

    /// Full 64-bit hardware microsecond counter.
    pub fn total_microseconds(&self) -> u64 {
        self.source.total_ticks()
    }

    /// High 32 bits of the hardware microsecond counter.
    pub fn microseconds_high_portion(&self) -> u32 {
        self.source.high_ticks()
    }

    /// Extend a 32-bit tick sample to a 64-bit system timestamp.
    ///
    /// See [`crate::extender`] for the one-wrap constraint.
    pub fn total_system_time_of_tick(&self, tick: u32) -> u64 {
        extend_tick(&*self.source, tick)
    }

    /// Host raw monotonic clock in microseconds.
    pub fn os_time_us(&self) -> TimeResult<u64> {
        os_clock::monotonic_raw_us()
    }

    /// Host wall clock in microseconds since the Unix epoch.
    pub fn os_time_us_alt(&self) -> TimeResult<u64> {
        os_clock::wall_clock_us()
    }

    /// See [`NotificationPool::register_relative`].
    pub fn register_timer_notification_relative(
        &self,
        handler: &NotifyHandler,
        delay_us: u64,
        context: NotifyContext,
        repeat: bool,
    ) -> TimeResult<usize> {
        self.notifications
            .register_relative(handler, delay_us, context, repeat)
    }

    /// See [`NotificationPool::register_absolute`].
    pub fn register_timer_notification_absolute(
        &self,
        handler: &NotifyHandler,
        trigger_us: u64,
        context: NotifyContext,
    ) -> TimeResult<usize> {
        self.notifications
            .register_absolute(handler, trigger_us, context)
    }

    /// See [`NotificationPool::deregister`].
    pub fn deregister_timer_notification(&self, handler: &NotifyHandler) -> TimeResult<usize> {
        self.notifications.deregister(handler)
    }

    /// See [`NotificationPool::is_expired`].
    pub fn is_timer_notification_expired(&self, handler: &NotifyHandler) -> TimeResult<bool> {
        self.notifications.is_expired(handler)
    }

    /// Read the RTC time-of-day registers.
    pub fn rtc_time(&self) -> TimeResult<RtcTime> {
        self.rtc.get_time()
    }

    /// Write the RTC time-of-day registers.
    pub fn set_rtc_time(&self, hours: u8, minutes: u8, seconds: u8) -> TimeResult<()> {
        self.rtc.set_time(hours, minutes, seconds)
    }

    /// Read the RTC date registers.
    pub fn rtc_date(&self) -> TimeResult<RtcDate> {
        self.rtc.get_date()
    }

    /// Write the RTC date registers.
    pub fn set_rtc_date(&self, date: RtcDate) -> TimeResult<()> {
        self.rtc.set_date(date)
    }
}
