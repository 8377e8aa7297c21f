//! Address translation
//!
//! The MMU holds the active page table, named by its owning task, and a
//! reference counter per frame. Translation splits a virtual address into a
//! page number and an offset. A reference to a valid page sets the frame's
//! access bits. A reference to an invalid page either raises a fault or,
//! when a fault on that page is already in flight, waits on the page.

use crate::config::MemoryConfig;
use crate::memory_audit::MemoryEvent;
use crate::wait_queue::Continuation;
use crate::SimulatedKernel;
use core_types::{FrameId, PageNumber, PageRef, ReferenceKind, TaskId, ThreadId};
use kernel_api::{Access, EventId, KernelError};

/// Processor translation state
#[derive(Debug, Clone)]
pub struct Mmu {
    active: Option<TaskId>,
    reference_counts: Vec<u64>,
}

impl Mmu {
    pub fn new(frame_count: usize) -> Self {
        Self {
            active: None,
            reference_counts: vec![0; frame_count],
        }
    }

    /// Task whose page table is bound to the processor
    pub fn active(&self) -> Option<TaskId> {
        self.active
    }

    pub(crate) fn bind(&mut self, task: TaskId) {
        self.active = Some(task);
    }

    pub(crate) fn unbind(&mut self) {
        self.active = None;
    }

    /// Successful references that landed in `frame`
    pub fn reference_count(&self, frame: FrameId) -> u64 {
        self.reference_counts
            .get(frame.index())
            .copied()
            .unwrap_or(0)
    }

    fn record_reference(&mut self, frame: FrameId) {
        if let Some(count) = self.reference_counts.get_mut(frame.index()) {
            *count += 1;
        }
    }
}

/// Splits `address` into its page number and the offset within the page
pub fn split_address(memory: &MemoryConfig, address: u64) -> (PageNumber, usize) {
    let page_size = memory.page_size() as u64;
    (
        PageNumber((address / page_size) as usize),
        (address % page_size) as usize,
    )
}

impl SimulatedKernel {
    /// Resolves a reference by `thread` in the active page table
    ///
    /// `store` is written into the page once it is resident.
    ///
    /// `Resolved` means the page is valid now. `Deferred` means another
    /// thread's fault on the page was in flight and `thread` waits on it;
    /// the reference is finished when that fault ends, abandoned with an
    /// `AccessAbandoned` audit event if the fault failed, and dropped if
    /// `thread` is killed first.
    /// A `Deferred` reference is not a promise that the page becomes valid.
    pub(crate) fn translate(
        &mut self,
        address: u64,
        kind: ReferenceKind,
        thread: ThreadId,
        store: Option<u8>,
    ) -> Result<Access<PageRef>, KernelError> {
        if self.scheduler.is_killed(thread) {
            return Err(KernelError::ThreadKilled(thread));
        }
        let task = self.mmu.active().ok_or(KernelError::NoActivePageTable)?;

        let page_count = self.config.memory.page_count();
        let (number, offset) = split_address(&self.config.memory, address);
        if number.index() >= page_count {
            return Err(KernelError::PageOutOfRange {
                address,
                page_count,
            });
        }

        let page = PageRef::new(task, number);
        let entry = self
            .page_entry(page)
            .cloned()
            .ok_or(KernelError::UnknownTask(task))?;
        let store = store.map(|value| (offset, value));

        if entry.is_valid() {
            self.touch_page(page, kind, store);
            return Ok(Access::Resolved(page));
        }

        if entry.validating_thread().is_some() {
            self.suspend_on(
                thread,
                EventId::Page(page),
                Continuation::Access { page, kind, store },
            )?;
            return Ok(Access::Deferred);
        }

        let outcome = self.handle_page_fault(thread, kind, page);
        if self.scheduler.is_killed(thread) {
            return Err(KernelError::ThreadKilled(thread));
        }
        outcome?;

        if self.touch_page(page, kind, store) {
            Ok(Access::Resolved(page))
        } else {
            Err(KernelError::FrameNotBound(page))
        }
    }

    /// Finishes a reference that waited on a page mid-fault
    pub(crate) fn complete_access(
        &mut self,
        thread: ThreadId,
        page: PageRef,
        kind: ReferenceKind,
        store: Option<(usize, u8)>,
    ) {
        if self.scheduler.is_killed(thread) {
            return;
        }
        if !self.touch_page(page, kind, store) {
            log::debug!("{} gave up on {}: page still invalid", thread, page);
            self.memory_audit.record(MemoryEvent::AccessAbandoned {
                thread,
                page,
                timestamp_ticks: self.now_ticks(),
            });
        }
    }

    /// Sets the access bits of a valid page's frame and applies `store`
    ///
    /// Returns false if the page is not valid.
    fn touch_page(
        &mut self,
        page: PageRef,
        kind: ReferenceKind,
        store: Option<(usize, u8)>,
    ) -> bool {
        let frame_id = match self.page_entry(page) {
            Some(entry) if entry.is_valid() => entry.frame(),
            _ => None,
        };
        let Some(frame_id) = frame_id else {
            return false;
        };
        let Some(frame) = self.frames.get_mut(frame_id) else {
            return false;
        };

        frame.touch(kind.is_write());
        if let Some((offset, value)) = store {
            if let Some(byte) = frame.contents_mut().get_mut(offset) {
                *byte = value;
            }
        }
        self.mmu.record_reference(frame_id);
        true
    }

    /// Writes one byte at `address` in the active address space
    pub fn store_byte(
        &mut self,
        address: u64,
        value: u8,
        thread: ThreadId,
    ) -> Result<Access<()>, KernelError> {
        let access = self.translate(address, ReferenceKind::Write, thread, Some(value))?;
        Ok(match access {
            Access::Resolved(_) => Access::Resolved(()),
            Access::Deferred => Access::Deferred,
        })
    }

    /// Reads one byte at `address` in the active address space
    pub fn load_byte(&mut self, address: u64, thread: ThreadId) -> Result<Access<u8>, KernelError> {
        let page = match self.translate(address, ReferenceKind::Read, thread, None)? {
            Access::Resolved(page) => page,
            Access::Deferred => return Ok(Access::Deferred),
        };
        let (_, offset) = split_address(&self.config.memory, address);
        let value = self
            .page_entry(page)
            .and_then(|entry| entry.frame())
            .and_then(|frame| self.frames.get(frame))
            .and_then(|frame| frame.contents().get(offset).copied())
            .ok_or(KernelError::FrameNotBound(page))?;
        Ok(Access::Resolved(value))
    }
}
