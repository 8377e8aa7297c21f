//! # Simulated Timer Device
//!
//! Deterministic clock and preemption alarm.
//!
//! The timer only advances when explicitly told to, so every burst length
//! and every quantum expiry in a test is exact.

use hal::{AlarmTimer, TimerDevice};

/// Simulated timer device with controllable time progression
///
/// # Examples
///
/// ```
/// use sim_kernel::timer::SimTimerDevice;
/// use hal::{AlarmTimer, TimerDevice};
///
/// let mut timer = SimTimerDevice::new();
/// timer.arm(30);
///
/// timer.advance_ticks(20);
/// assert!(!timer.take_expired());
///
/// timer.advance_ticks(10);
/// assert_eq!(timer.poll_ticks(), 30);
/// assert!(timer.take_expired());
/// ```
#[derive(Debug, Clone)]
pub struct SimTimerDevice {
    /// Current tick count
    ticks: u64,
    /// Tick at which the armed alarm expires
    alarm_at: Option<u64>,
}

impl SimTimerDevice {
    /// Creates a new simulated timer starting at tick 0
    pub fn new() -> Self {
        Self {
            ticks: 0,
            alarm_at: None,
        }
    }

    /// Creates a new simulated timer starting at a specific tick count
    pub fn with_initial_ticks(ticks: u64) -> Self {
        Self {
            ticks,
            alarm_at: None,
        }
    }

    /// Advances the timer by the specified number of ticks
    ///
    /// Saturates at `u64::MAX`.
    pub fn advance_ticks(&mut self, delta: u64) {
        self.ticks = self.ticks.saturating_add(delta);
    }

    /// Ticks left until the armed alarm expires
    pub fn ticks_until_alarm(&self) -> Option<u64> {
        self.alarm_at.map(|at| at.saturating_sub(self.ticks))
    }

    /// Returns the current tick count without requiring mutable access
    pub fn current_ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for SimTimerDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDevice for SimTimerDevice {
    fn poll_ticks(&mut self) -> u64 {
        self.ticks
    }
}

impl AlarmTimer for SimTimerDevice {
    fn arm(&mut self, delay_ticks: u64) {
        self.alarm_at = Some(self.ticks.saturating_add(delay_ticks));
    }

    fn disarm(&mut self) {
        self.alarm_at = None;
    }

    fn deadline(&self) -> Option<u64> {
        self.alarm_at
    }

    fn take_expired(&mut self) -> bool {
        match self.alarm_at {
            Some(at) if self.ticks >= at => {
                self.alarm_at = None;
                true
            }
            _ => false,
        }
    }
}
