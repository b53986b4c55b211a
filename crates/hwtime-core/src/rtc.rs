//! Battery-backed real-time clock pass-through.
//!
//! The board communication client performs the register I/O. This module
//! forwards each call and collapses any I/O failure into
//! [`TimeError::BoardComm`]. Register values are passed through unconverted;
//! no calendar validation happens here.

use crate::sync::lock;
use hwtime_common::config::RtcConfig;
use hwtime_common::error::{TimeError, TimeResult};
use hwtime_common::time::{RtcDate, RtcTime};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Board communication client exposing the RTC registers.
pub trait BoardClient: Send + Sync {
    /// Read the time-of-day registers.
    fn get_rtc_time(&self) -> io::Result<RtcTime>;

    /// Write the time-of-day registers. Sub-seconds are not writable.
    fn set_rtc_time(&self, hours: u8, minutes: u8, seconds: u8) -> io::Result<()>;

    /// Read the date registers.
    fn get_rtc_date(&self) -> io::Result<RtcDate>;

    /// Write the date registers.
    fn set_rtc_date(&self, date: RtcDate) -> io::Result<()>;
}

impl<T: BoardClient + ?Sized> BoardClient for Arc<T> {
    fn get_rtc_time(&self) -> io::Result<RtcTime> {
        (**self).get_rtc_time()
    }

    fn set_rtc_time(&self, hours: u8, minutes: u8, seconds: u8) -> io::Result<()> {
        (**self).set_rtc_time(hours, minutes, seconds)
    }

    fn get_rtc_date(&self) -> io::Result<RtcDate> {
        (**self).get_rtc_date()
    }

    fn set_rtc_date(&self, date: RtcDate) -> io::Result<()> {
        (**self).set_rtc_date(date)
    }
}

fn board_comm(op: &'static str) -> impl FnOnce(io::Error) -> TimeError {
    move |e| {
        warn!(op, error = %e, "RTC board communication failed");
        TimeError::BoardComm(format!("{op}: {e}"))
    }
}

/// RTC accessors over a [`BoardClient`].
#[derive(Debug)]
pub struct Rtc<B> {
    board: B,
}

impl<B: BoardClient> Rtc<B> {
    /// Wrap a board client.
    pub fn new(board: B) -> Self {
        Self { board }
    }

    /// The underlying board client.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Read the time-of-day registers.
    pub fn get_time(&self) -> TimeResult<RtcTime> {
        self.board.get_rtc_time().map_err(board_comm("get_rtc_time"))
    }

    /// Write hours, minutes and seconds.
    pub fn set_time(&self, hours: u8, minutes: u8, seconds: u8) -> TimeResult<()> {
        self.board
            .set_rtc_time(hours, minutes, seconds)
            .map_err(board_comm("set_rtc_time"))?;
        debug!(hours, minutes, seconds, "RTC time written");
        Ok(())
    }

    /// Read the date registers.
    pub fn get_date(&self) -> TimeResult<RtcDate> {
        self.board.get_rtc_date().map_err(board_comm("get_rtc_date"))
    }

    /// Write the date registers.
    pub fn set_date(&self, date: RtcDate) -> TimeResult<()> {
        self.board
            .set_rtc_date(date)
            .map_err(board_comm("set_rtc_date"))?;
        debug!(?date, "RTC date written");
        Ok(())
    }
}

/// In-memory board with RTC registers.
#[derive(Debug, Default)]
pub struct SimulatedBoard {
    registers: Mutex<(RtcTime, RtcDate)>,
    io_failure: AtomicBool,
}

impl SimulatedBoard {
    /// Create a board with default register contents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a board with the configured initial registers.
    pub fn from_config(config: &RtcConfig) -> Self {
        Self {
            registers: Mutex::new((config.time, config.date)),
            io_failure: AtomicBool::new(false),
        }
    }

    /// Make every subsequent register access fail.
    pub fn set_io_failure(&self, fail: bool) {
        self.io_failure.store(fail, Ordering::Release);
    }

    fn check_link(&self) -> io::Result<()> {
        if self.io_failure.load(Ordering::Acquire) {
            Err(io::Error::new(io::ErrorKind::TimedOut, "no response from board"))
        } else {
            Ok(())
        }
    }
}

impl BoardClient for SimulatedBoard {
    fn get_rtc_time(&self) -> io::Result<RtcTime> {
        self.check_link()?;
        Ok(lock(&self.registers).0)
    }

    fn set_rtc_time(&self, hours: u8, minutes: u8, seconds: u8) -> io::Result<()> {
        self.check_link()?;
        lock(&self.registers).0 = RtcTime {
            hours,
            minutes,
            seconds,
            subseconds: 0,
        };
        Ok(())
    }

    fn get_rtc_date(&self) -> io::Result<RtcDate> {
        self.check_link()?;
        Ok(lock(&self.registers).1)
    }

    fn set_rtc_date(&self, date: RtcDate) -> io::Result<()> {
        self.check_link()?;
        lock(&self.registers).1 = date;
        Ok(())
    }
}
