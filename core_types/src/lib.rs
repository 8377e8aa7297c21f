//! # Core Types
//!
//! This crate defines the fundamental types shared by the simulated kernel
//! core and its collaborators.
//!
//! ## Philosophy
//!
//! - **Handles, not pointers**: frames and pages refer to each other through
//!   plain identifiers into flat tables.
//! - **Type safety first**: a frame index cannot be confused with a page number.
//!
//! ## Key Types
//!
//! - [`TaskId`]: Unique identifier for tasks (address space owners)
//! - [`ThreadId`]: Unique identifier for schedulable threads
//! - [`FrameId`]: Index of a physical frame
//! - [`PageRef`]: Handle to one page table entry of one task

pub mod ids;
pub mod memory;

pub use ids::{TaskId, ThreadId};
pub use memory::{FrameId, PageNumber, PageRef, ReferenceKind, SwapSlot};
