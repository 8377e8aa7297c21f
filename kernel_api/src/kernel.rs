//! Kernel API trait and wait-point types

use crate::{Duration, Instant, IoRequest, IoRequestId, KernelError};
use core_types::{PageRef, ReferenceKind, TaskId, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one page fault instance
///
/// Each fault gets its own completion event, separate from the page, so the
/// thread that raised the fault is released apart from the co-waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FaultId(pub u64);

/// Something a thread can wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventId {
    /// A page whose fault is in flight
    Page(PageRef),
    /// Completion of a specific fault
    FaultCompletion(FaultId),
    /// Completion of a swap transfer
    Io(IoRequestId),
    /// Caller-defined event
    User(u64),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Page(page) => write!(f, "event:page:{}", page),
            EventId::FaultCompletion(id) => write!(f, "event:fault:{}", id.0),
            EventId::Io(id) => write!(f, "event:{}", id),
            EventId::User(n) => write!(f, "event:user:{}", n),
        }
    }
}

/// Result of an operation that may have to wait on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<T> {
    /// The operation finished before returning
    Resolved(T),
    /// The caller was suspended on the page; the operation completes when the
    /// page's waiters are released
    Deferred,
}

impl<T> Access<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Access::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Access::Resolved(value) => Some(value),
            Access::Deferred => None,
        }
    }
}

/// The core's operation surface
///
/// Implemented by the simulated kernel. Every state change that can affect
/// which thread should hold the processor ends with a dispatch.
///
/// # Example
///
/// ```
/// use core_types::ReferenceKind;
/// use kernel_api::{KernelApi, KernelError};
///
/// fn touch_first_page<K: KernelApi>(kernel: &mut K) -> Result<(), KernelError> {
///     let task = kernel.create_task(1);
///     let thread = kernel.create_thread(task)?;
///     kernel.refer(0, ReferenceKind::Write, thread)?;
///     Ok(())
/// }
/// ```
pub trait KernelApi {
    /// Creates a task with an empty, fully invalid page table
    fn create_task(&mut self, priority: u32) -> TaskId;

    /// Creates a Ready thread in `task`
    ///
    /// Fails when the task is unknown or already at its thread limit.
    /// Dispatches either way.
    fn create_thread(&mut self, task: TaskId) -> Result<ThreadId, KernelError>;

    /// Kills a thread; the task dies with its last thread
    fn kill_thread(&mut self, thread: ThreadId) -> Result<(), KernelError>;

    /// Kills every thread of a task
    fn kill_task(&mut self, task: TaskId) -> Result<(), KernelError>;

    /// Suspends `thread` on `event`, nesting if it is already waiting
    fn suspend(&mut self, thread: ThreadId, event: EventId) -> Result<(), KernelError>;

    /// Undoes one level of waiting
    ///
    /// Resuming a thread that is not waiting is rejected and changes nothing.
    fn resume(&mut self, thread: ThreadId) -> Result<(), KernelError>;

    /// Binds the processor to the next thread
    ///
    /// Returns the dispatched thread, or `NoRunnableThread` when idle.
    fn dispatch(&mut self) -> Result<ThreadId, KernelError>;

    /// Translates `address` in the active page table
    ///
    /// On `Resolved` the page is valid and its frame's access bits are set.
    /// `Deferred` parks `thread` behind a fault already in flight; the
    /// reference may still be abandoned if that fault fails.
    fn refer(
        &mut self,
        address: u64,
        kind: ReferenceKind,
        thread: ThreadId,
    ) -> Result<Access<PageRef>, KernelError>;

    /// Pins the frame of `page` for the duration of `request`
    fn lock_page(&mut self, page: PageRef, request: &IoRequest)
        -> Result<Access<()>, KernelError>;

    /// Releases one pin; unlocking an unlocked page is a no-op
    fn unlock_page(&mut self, page: PageRef);

    /// Returns the current simulated time
    fn now(&self) -> Instant;

    /// Advances simulated time, delivering the timer interrupt if due
    fn advance_time(&mut self, duration: Duration);
}
