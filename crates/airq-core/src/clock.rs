//! Monotonic millisecond clock
//!
//! The sensor driver only needs a tick count for breath detection and for
//! stamping acquisitions. Wall-clock time lives in [`crate::rtc`].

/// Source of a monotonic millisecond tick.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point (usually power-on).
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Tick source backed by the embassy time driver.
#[cfg(feature = "embassy-clock")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-clock")]
impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
