//! # Timer Device
//!
//! Hardware abstraction for monotonic time and the preemption alarm.
//!
//! ## Design Principles
//!
//! 1. **Monotonic**: Ticks never go backwards
//! 2. **Non-blocking**: Polling always returns immediately
//! 3. **One-shot alarm**: Arming replaces any earlier alarm; an expired alarm
//!    fires once and disarms itself
//! 4. **Frequency-agnostic**: No assumptions about tick rate at this layer

/// Hardware timer device trait
///
/// Provides access to a monotonic tick counter.
///
/// # Examples
///
/// ```
/// use hal::TimerDevice;
///
/// fn measure_operation<T: TimerDevice>(timer: &mut T) -> u64 {
///     let start = timer.poll_ticks();
///     // ... do work ...
///     let end = timer.poll_ticks();
///     end - start
/// }
/// ```
pub trait TimerDevice {
    /// Returns the current tick count
    fn poll_ticks(&mut self) -> u64;
}

/// Programmable one-shot alarm
///
/// The kernel arms the alarm with the dispatched thread's quantum. When it
/// expires the harness delivers a timer interrupt.
pub trait AlarmTimer: TimerDevice {
    /// Arms the alarm `delay_ticks` from now, replacing any armed alarm
    fn arm(&mut self, delay_ticks: u64);

    /// Cancels the armed alarm, if any
    fn disarm(&mut self);

    /// Tick at which the armed alarm expires
    fn deadline(&self) -> Option<u64>;

    /// Consumes an expired alarm
    ///
    /// Returns true exactly once per expiry.
    fn take_expired(&mut self) -> bool;
}
