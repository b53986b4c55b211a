//! Host operating system clocks, in microseconds.
//!
//! These are independent of the hardware tick source and are meant for
//! correlating hardware timestamps with host-side events.

use hwtime_common::error::{TimeError, TimeResult};

/// Convert a `(seconds, nanoseconds)` reading to microseconds.
fn to_micros(secs: i64, nanos: i64) -> TimeResult<u64> {
    let secs = u64::try_from(secs).map_err(|_| TimeError::Clock(format!("negative seconds {secs}")))?;
    let nanos =
        u64::try_from(nanos).map_err(|_| TimeError::Clock(format!("negative nanoseconds {nanos}")))?;
    Ok(secs * 1_000_000 + nanos / 1_000)
}

#[cfg(unix)]
mod imp {
    use super::to_micros;
    use hwtime_common::error::{TimeError, TimeResult};
    use nix::time::{clock_gettime, ClockId};

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const MONOTONIC: ClockId = ClockId::CLOCK_MONOTONIC_RAW;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const MONOTONIC: ClockId = ClockId::CLOCK_MONOTONIC;

    // `time_t` and `c_long` are 32 bits on some targets.
    #[allow(clippy::useless_conversion)]
    fn read(clock: ClockId) -> TimeResult<u64> {
        let ts = clock_gettime(clock).map_err(|e| TimeError::Clock(format!("{clock:?}: {e}")))?;
        to_micros(i64::from(ts.tv_sec()), i64::from(ts.tv_nsec()))
    }

    pub(super) fn monotonic_raw_us() -> TimeResult<u64> {
        read(MONOTONIC)
    }

    pub(super) fn wall_clock_us() -> TimeResult<u64> {
        read(ClockId::CLOCK_REALTIME)
    }
}

#[cfg(not(unix))]
mod imp {
    use super::to_micros;
    use hwtime_common::error::{TimeError, TimeResult};
    use std::sync::OnceLock;
    use std::time::{Instant, SystemTime, UNIX_EPOCH};

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    pub(super) fn monotonic_raw_us() -> TimeResult<u64> {
        Ok(EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64)
    }

    pub(super) fn wall_clock_us() -> TimeResult<u64> {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TimeError::Clock(e.to_string()))?;
        to_micros(d.as_secs() as i64, i64::from(d.subsec_nanos()))
    }
}

/// Microseconds on the raw monotonic clock (not slewed by NTP).
pub fn monotonic_raw_us() -> TimeResult<u64> {
    imp::monotonic_raw_us()
}

/// Microseconds since the Unix epoch on the wall clock.
pub fn wall_clock_us() -> TimeResult<u64> {
    imp::wall_clock_us()
}
