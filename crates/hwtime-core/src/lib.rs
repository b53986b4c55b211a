#![doc = "Timing core: tick extension, hardware timer notifications, and RTC access."]

pub mod extender;
pub mod notification;
pub mod os_clock;
pub mod rtc;
pub mod system_clock;
pub mod tick_source;

mod sync;

pub use extender::*;
pub use notification::*;
pub use rtc::*;
pub use system_clock::*;
pub use tick_source::*;
