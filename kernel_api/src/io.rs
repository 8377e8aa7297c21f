//! Contracts for the device, swap and resource collaborators
//!
//! The core never performs I/O itself. A swap transfer is described by an
//! [`IoRequest`], queued on [`DeviceQueues`], and its data is moved by a
//! [`BackingStore`] once the request completes. From the requesting
//! thread's point of view the transfer blocks; the processor keeps running
//! other threads meanwhile.

use core_types::{PageRef, SwapSlot, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IoRequestId(pub u64);

impl fmt::Display for IoRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iorb:{}", self.0)
    }
}

/// Direction of a swap transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Backing store to frame
    SwapIn,
    /// Frame to backing store
    SwapOut,
}

/// A page-sized transfer between a frame and a backing store slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoRequest {
    pub id: IoRequestId,
    /// Thread on whose behalf the transfer runs
    pub thread: ThreadId,
    /// Page whose contents move
    pub page: PageRef,
    pub slot: SwapSlot,
    pub direction: TransferDirection,
}

/// Per-task swap storage
pub trait BackingStore {
    /// Fills `buf` with the contents of `request.slot`
    ///
    /// Slots that were never written read back as zeroes.
    fn read(&mut self, request: &IoRequest, buf: &mut [u8]);

    /// Stores `data` into `request.slot`
    fn write(&mut self, request: &IoRequest, data: &[u8]);
}

/// Device request queues
pub trait DeviceQueues {
    /// Queues a request for service
    fn enqueue(&mut self, request: IoRequest);

    /// Removes a serviced request
    ///
    /// Returns false if the request is no longer queued (it was cancelled).
    fn complete(&mut self, id: IoRequestId) -> bool;

    /// Cancels every pending request owned by `thread`
    fn cancel_pending_io(&mut self, thread: ThreadId) -> Vec<IoRequest>;
}

/// Shared pool of abstract resources
pub trait ResourcePool {
    /// Returns everything `thread` holds to the pool
    ///
    /// Returns the number of units released.
    fn give_up_resources(&mut self, thread: ThreadId) -> u64;
}
