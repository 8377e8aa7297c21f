//! # Memory Types
//!
//! Plain vocabulary for the paging core.
//!
//! ## Philosophy
//!
//! - **Frames and pages are table slots**: a [`FrameId`] indexes the frame
//!   table, a [`PageRef`] names one entry of one task's page table.
//! - **Back-references are handles**: a frame records the `PageRef` it holds,
//!   a page records the `FrameId` backing it. Breaking the pair is two writes.

use crate::ids::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a physical frame
///
/// Frame IDs are assigned once when the frame table is built and never reused
/// for anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub usize);

impl FrameId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// Virtual page number within a task's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageNumber(pub usize);

impl PageNumber {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Handle to a single page table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub task: TaskId,
    pub page: PageNumber,
}

impl PageRef {
    pub fn new(task: TaskId, page: PageNumber) -> Self {
        Self { task, page }
    }

    /// The swap slot that backs this page
    pub fn swap_slot(&self) -> SwapSlot {
        SwapSlot {
            task: self.task,
            page: self.page,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task, self.page)
    }
}

/// Location of a page inside its task's backing store
///
/// The layout of the store itself belongs to the swap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapSlot {
    pub task: TaskId,
    pub page: PageNumber,
}

/// Kind of memory reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Read,
    Write,
    /// Reference made while pinning a page for I/O
    Lock,
}

impl ReferenceKind {
    pub fn is_write(&self) -> bool {
        matches!(self, ReferenceKind::Write)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Read => write!(f, "read"),
            ReferenceKind::Write => write!(f, "write"),
            ReferenceKind::Lock => write!(f, "lock"),
        }
    }
}
