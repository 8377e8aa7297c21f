//! Kernel error types

use core_types::{PageRef, TaskId, ThreadId};
use thiserror::Error;

/// Coarse classification of a failed operation
///
/// Callers that only care whether memory ran out, or whether the operation
/// simply did not happen, match on this instead of on [`KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Thread died mid-operation, invalid or redundant request
    Failure,
    /// Every frame is locked or reserved
    NotEnoughMemory,
}

/// Errors that can occur inside the paging and scheduling core
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// The thread was killed before the operation could finish
    #[error("{0} was killed")]
    ThreadKilled(ThreadId),

    /// A fault was raised on a page that is already resident
    #[error("page {0} is already valid")]
    PageAlreadyValid(PageRef),

    /// No frame in the table is both unlocked and unreserved
    #[error("not enough memory: every frame is locked or reserved")]
    NotEnoughMemory,

    /// Resume was called on a thread that is not waiting
    #[error("{0} is not waiting")]
    NotWaiting(ThreadId),

    /// The task already holds its maximum number of threads
    #[error("{0} has reached its thread limit")]
    ThreadLimitReached(TaskId),

    /// Task not found
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// Thread not found
    #[error("unknown thread: {0}")]
    UnknownThread(ThreadId),

    /// Virtual address outside the address space
    #[error("address {address:#x} is outside the {page_count}-page address space")]
    PageOutOfRange { address: u64, page_count: usize },

    /// No page table is bound to the processor
    #[error("no active page table")]
    NoActivePageTable,

    /// The page has no frame to pin
    #[error("page {0} has no frame bound")]
    FrameNotBound(PageRef),

    /// Both ready queues are empty
    #[error("no runnable thread")]
    NoRunnableThread,
}

impl KernelError {
    /// Maps the error onto the Failure / NotEnoughMemory taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::NotEnoughMemory => ErrorKind::NotEnoughMemory,
            _ => ErrorKind::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_enough_memory_kind() {
        assert_eq!(KernelError::NotEnoughMemory.kind(), ErrorKind::NotEnoughMemory);
    }

    #[test]
    fn test_everything_else_is_failure() {
        let thread = ThreadId::new();
        assert_eq!(KernelError::ThreadKilled(thread).kind(), ErrorKind::Failure);
        assert_eq!(KernelError::NotWaiting(thread).kind(), ErrorKind::Failure);
        assert_eq!(KernelError::NoRunnableThread.kind(), ErrorKind::Failure);
    }

    #[test]
    fn test_error_display() {
        let err = KernelError::PageOutOfRange {
            address: 0x10000,
            page_count: 64,
        };
        assert_eq!(
            err.to_string(),
            "address 0x10000 is outside the 64-page address space"
        );
    }
}
