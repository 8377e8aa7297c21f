//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware traits the kernel core consumes.
//!
//! ## Philosophy
//!
//! **The clock is a device, not a global variable.**
//!
//! The scheduler reads time and arms its preemption alarm only through these
//! traits, so the simulation harness and a real timer are interchangeable.

pub mod timer;

pub use timer::{AlarmTimer, TimerDevice};
