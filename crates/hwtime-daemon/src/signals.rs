//! SIGINT/SIGTERM handling for graceful daemon shutdown.
//!
//! The signal handlers only set an atomic flag; the main loop polls it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Set from the signal handlers.
static SIGNALED: AtomicBool = AtomicBool::new(false);

/// Shutdown request flag fed by Unix signals and manual requests.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    manual: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Install SIGINT and SIGTERM handlers.
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            extern "C" fn on_signal(_: libc::c_int) {
                SIGNALED.store(true, Ordering::Relaxed);
            }

            // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
            unsafe {
                libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
                libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
            }
            debug!("Unix signal handlers registered");
        }

        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn requested(&self) -> bool {
        SIGNALED.load(Ordering::Relaxed) || self.manual.load(Ordering::Relaxed)
    }

    /// Request shutdown from code.
    pub fn request(&self) {
        info!("Manual shutdown requested");
        self.manual.store(true, Ordering::Relaxed);
    }

    /// Sleep for up to `timeout`, returning early with `true` on shutdown.
    pub fn wait(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(20);

        while start.elapsed() < timeout {
            if self.requested() {
                return true;
            }
            std::thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
        }

        self.requested()
    }
}
