use thiserror::Error;

/// Errors raised by the timing core: slot allocation, hardware rejection,
/// and board communication failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Every notification slot is armed.
    #[error("no free notification slot (capacity {capacity})")]
    NoFreeSlot {
        /// Number of slots in the pool.
        capacity: usize,
    },

    /// The tick source refused to arm a hardware timer.
    #[error("tick source rejected arming slot {slot}: {reason}")]
    ArmRejected {
        /// Hardware timer slot.
        slot: usize,
        /// Reason reported by the tick source.
        reason: String,
    },

    /// The tick source refused to disarm a hardware timer.
    #[error("tick source rejected disarming slot {slot}: {reason}")]
    DisarmRejected {
        /// Hardware timer slot.
        slot: usize,
        /// Reason reported by the tick source.
        reason: String,
    },

    /// The tick source client is no longer available.
    #[error("tick source unavailable: {0}")]
    TickSourceUnavailable(String),

    /// No armed slot holds the given handler.
    #[error("handler is not registered")]
    NotRegistered,

    /// Absolute registration for an instant that has already passed.
    #[error("trigger timestamp {trigger_us}us is not after current time {now_us}us")]
    TriggerInPast {
        /// Requested trigger timestamp in microseconds.
        trigger_us: u64,
        /// Extended timestamp at the time of the request.
        now_us: u64,
    },

    /// Delay does not fit the hardware's millisecond argument.
    #[error("delay of {delay_us}us is out of range for the hardware timer")]
    DelayOutOfRange {
        /// Requested delay in microseconds.
        delay_us: u64,
    },

    /// A notification handler called into a notification pool while being dispatched.
    #[error("re-entrant call into notification pool from a handler")]
    ReentrantCall,

    /// Board communication error during RTC access.
    #[error("board communication error: {0}")]
    BoardComm(String),

    /// The host operating system clock could not be read.
    #[error("OS clock read failed: {0}")]
    Clock(String),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for timing operations.
pub type TimeResult<T> = Result<T, TimeError>;
