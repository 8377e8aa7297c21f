//! Paging audit events (test-only)
//!
//! Every fault, eviction, transfer and lock the core performs is recorded
//! here so tests can assert on the exact sequence.

use core_types::{FrameId, PageRef, ReferenceKind, TaskId, ThreadId};
use kernel_api::{FaultId, IoRequestId, TransferDirection};
use serde::{Deserialize, Serialize};

/// How a page fault ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultOutcome {
    Installed,
    AlreadyValid,
    NotEnoughMemory,
    /// The faulting thread died or the fault could not proceed
    Failed,
}

/// Paging audit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryEvent {
    /// A fault began on an invalid page
    FaultStarted {
        fault: FaultId,
        thread: ThreadId,
        page: PageRef,
        kind: ReferenceKind,
        timestamp_ticks: u64,
    },
    /// A frame was reserved for a fault
    FrameAssigned {
        fault: FaultId,
        frame: FrameId,
        /// True when the frame was taken from another page
        victim: bool,
        timestamp_ticks: u64,
    },
    /// A resident page lost its frame
    PageEvicted {
        frame: FrameId,
        page: PageRef,
        timestamp_ticks: u64,
    },
    /// A swap transfer was queued
    TransferStarted {
        request: IoRequestId,
        direction: TransferDirection,
        page: PageRef,
        frame: FrameId,
        timestamp_ticks: u64,
    },
    /// A swap transfer left the device queue
    TransferFinished {
        request: IoRequestId,
        direction: TransferDirection,
        /// False when a kill purged the request before it was serviced
        serviced: bool,
        timestamp_ticks: u64,
    },
    /// A fault finished
    FaultFinished {
        fault: FaultId,
        page: PageRef,
        outcome: FaultOutcome,
        timestamp_ticks: u64,
    },
    /// A frame was pinned
    PageLocked {
        page: PageRef,
        frame: FrameId,
        thread: ThreadId,
        /// True when the lock completed after waiting on the page
        deferred: bool,
        timestamp_ticks: u64,
    },
    /// A deferred reference or lock found its page still invalid
    AccessAbandoned {
        thread: ThreadId,
        page: PageRef,
        timestamp_ticks: u64,
    },
    /// A dead task's frames went back to the free pool
    TaskMemoryReleased {
        task: TaskId,
        frames: usize,
        timestamp_ticks: u64,
    },
}

/// Audit log for paging operations
#[derive(Debug, Clone)]
pub struct MemoryAuditLog {
    events: Vec<MemoryEvent>,
}

impl MemoryAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Records an event
    pub fn record(&mut self, event: MemoryEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[MemoryEvent] {
        &self.events
    }

    /// Clears all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&MemoryEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&MemoryEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}
