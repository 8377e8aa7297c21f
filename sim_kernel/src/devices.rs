//! Simulated device queues and resource pool
//!
//! Both collaborators are bookkeeping only. The device queue remembers which
//! transfers are outstanding so a kill can purge them; the resource pool
//! tracks units held per thread so a kill can hand them back.

use core_types::ThreadId;
use kernel_api::{DeviceQueues, IoRequest, IoRequestId, ResourcePool};
use std::collections::HashMap;

/// Outstanding swap transfers
#[derive(Debug, Clone, Default)]
pub struct SimDeviceQueues {
    pending: Vec<IoRequest>,
    completed: u64,
    cancelled: Vec<IoRequest>,
}

impl SimDeviceQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[IoRequest] {
        &self.pending
    }

    /// Requests purged by kills, oldest first
    pub fn cancelled(&self) -> &[IoRequest] {
        &self.cancelled
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }
}

impl DeviceQueues for SimDeviceQueues {
    fn enqueue(&mut self, request: IoRequest) {
        self.pending.push(request);
    }

    fn complete(&mut self, id: IoRequestId) -> bool {
        match self.pending.iter().position(|r| r.id == id) {
            Some(index) => {
                self.pending.remove(index);
                self.completed += 1;
                true
            }
            None => false,
        }
    }

    fn cancel_pending_io(&mut self, thread: ThreadId) -> Vec<IoRequest> {
        let (cancelled, kept): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|r| r.thread == thread);
        self.pending = kept;
        self.cancelled.extend(cancelled.iter().copied());
        cancelled
    }
}

/// A fixed pool of interchangeable resource units
#[derive(Debug, Clone)]
pub struct SimResourcePool {
    available: u64,
    held: HashMap<ThreadId, u64>,
}

impl SimResourcePool {
    /// Creates a pool of `capacity` units
    pub fn new(capacity: u64) -> Self {
        Self {
            available: capacity,
            held: HashMap::new(),
        }
    }

    /// Takes `units` for `thread` if the pool can cover them
    pub fn acquire(&mut self, thread: ThreadId, units: u64) -> bool {
        if units > self.available {
            return false;
        }
        self.available -= units;
        *self.held.entry(thread).or_insert(0) += units;
        true
    }

    pub fn available(&self) -> u64 {
        self.available
    }

    pub fn held_by(&self, thread: ThreadId) -> u64 {
        self.held.get(&thread).copied().unwrap_or(0)
    }
}

impl Default for SimResourcePool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ResourcePool for SimResourcePool {
    fn give_up_resources(&mut self, thread: ThreadId) -> u64 {
        let released = self.held.remove(&thread).unwrap_or(0);
        self.available += released;
        released
    }
}
