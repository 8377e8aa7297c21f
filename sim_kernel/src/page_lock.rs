//! Page pinning
//!
//! A transfer pins the frame under its page so the frame cannot be chosen as
//! a victim while data moves. Locking an invalid page first makes it valid,
//! either by faulting it in or by waiting for the fault already in flight.
//!
//! Every pin is recorded against the thread that took it, so a frame's lock
//! count always equals the number of recorded pins on it and a dying thread
//! gives its pins back.

use crate::memory_audit::MemoryEvent;
use crate::wait_queue::Continuation;
use crate::SimulatedKernel;
use core_types::{FrameId, PageRef, ReferenceKind, ThreadId};
use kernel_api::{Access, EventId, IoRequest, IoRequestId, KernelError};

/// Pins held per thread, oldest first
#[derive(Debug, Default)]
pub(crate) struct PinLedger {
    pins: Vec<(ThreadId, FrameId)>,
}

impl PinLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, thread: ThreadId, frame: FrameId) {
        self.pins.push((thread, frame));
    }

    /// Removes the latest pin `thread` holds on `frame`
    pub fn take(&mut self, thread: ThreadId, frame: FrameId) -> bool {
        match self.pins.iter().rposition(|pin| *pin == (thread, frame)) {
            Some(at) => {
                self.pins.remove(at);
                true
            }
            None => false,
        }
    }

    /// Removes the latest pin on `frame`, whoever holds it
    pub fn take_latest_on(&mut self, frame: FrameId) -> Option<ThreadId> {
        let at = self.pins.iter().rposition(|(_, f)| *f == frame)?;
        Some(self.pins.remove(at).0)
    }

    /// Removes every pin `thread` holds, returning the pinned frames
    pub fn take_thread(&mut self, thread: ThreadId) -> Vec<FrameId> {
        let mut frames = Vec::new();
        self.pins.retain(|(t, f)| {
            if *t == thread {
                frames.push(*f);
                false
            } else {
                true
            }
        });
        frames
    }

    /// Removes every pin on `frame`, returning how many there were
    pub fn take_frame(&mut self, frame: FrameId) -> usize {
        let before = self.pins.len();
        self.pins.retain(|(_, f)| *f != frame);
        before - self.pins.len()
    }

    pub fn count_on(&self, frame: FrameId) -> usize {
        self.pins.iter().filter(|(_, f)| *f == frame).count()
    }

    pub fn held_by(&self, thread: ThreadId) -> Vec<FrameId> {
        self.pins
            .iter()
            .filter(|(t, _)| *t == thread)
            .map(|(_, f)| *f)
            .collect()
    }
}

impl SimulatedKernel {
    /// Increments the lock count of the frame backing `page`
    ///
    /// The requester is `request.thread`. When it is itself resolving a
    /// fault on the page (the swap-in of that fault) the frame is already
    /// bound and is pinned directly. A killed requester pins nothing.
    pub(crate) fn pin_page(
        &mut self,
        page: PageRef,
        request: &IoRequest,
    ) -> Result<Access<()>, KernelError> {
        let requester = request.thread;
        if self.scheduler.is_killed(requester) {
            return Err(KernelError::ThreadKilled(requester));
        }
        let entry = self
            .page_entry(page)
            .cloned()
            .ok_or(KernelError::UnknownTask(page.task))?;

        if entry.is_valid() {
            let frame = entry.frame().ok_or(KernelError::FrameNotBound(page))?;
            self.lock_frame(requester, frame);
            self.record_lock(page, requester, false);
            return Ok(Access::Resolved(()));
        }

        match entry.validating_thread() {
            None => {
                let outcome = self.handle_page_fault(requester, ReferenceKind::Lock, page);
                if self.scheduler.is_killed(requester) {
                    return Err(KernelError::ThreadKilled(requester));
                }
                outcome?;
                let frame = self
                    .page_entry(page)
                    .filter(|entry| entry.is_valid())
                    .and_then(|entry| entry.frame())
                    .ok_or(KernelError::FrameNotBound(page))?;
                self.lock_frame(requester, frame);
                self.record_lock(page, requester, false);
                Ok(Access::Resolved(()))
            }
            Some(validator) if validator == requester => {
                let frame = entry.frame().ok_or(KernelError::FrameNotBound(page))?;
                self.lock_frame(requester, frame);
                self.record_lock(page, requester, false);
                Ok(Access::Resolved(()))
            }
            Some(_) => {
                self.suspend_on(
                    requester,
                    EventId::Page(page),
                    Continuation::Lock {
                        page,
                        request: request.id,
                    },
                )?;
                Ok(Access::Deferred)
            }
        }
    }

    /// Drops the latest pin on `page`; a page with no pins is left alone
    pub(crate) fn unpin_page(&mut self, page: PageRef) {
        if let Some(frame) = self.page_entry(page).and_then(|entry| entry.frame()) {
            if self.pins.take_latest_on(frame).is_some() {
                self.frames.unlock(frame);
            }
        }
    }

    /// Drops a pin `thread` took on `frame`, if it still holds one
    pub(crate) fn release_pin(&mut self, thread: ThreadId, frame: FrameId) {
        if self.pins.take(thread, frame) {
            self.frames.unlock(frame);
        }
    }

    /// Drops every pin held by `thread`
    pub(crate) fn release_pins_of(&mut self, thread: ThreadId) -> usize {
        let frames = self.pins.take_thread(thread);
        for frame in &frames {
            self.frames.unlock(*frame);
        }
        frames.len()
    }

    /// Drops every pin on `frame`, whoever holds it
    pub(crate) fn release_pins_on(&mut self, frame: FrameId) {
        for _ in 0..self.pins.take_frame(frame) {
            self.frames.unlock(frame);
        }
    }

    fn lock_frame(&mut self, thread: ThreadId, frame: FrameId) {
        self.frames.lock(frame);
        self.pins.record(thread, frame);
    }

    /// Finishes a lock that waited on a page mid-fault
    pub(crate) fn complete_lock(&mut self, thread: ThreadId, page: PageRef, request: IoRequestId) {
        if self.scheduler.is_killed(thread) {
            return;
        }
        let frame = self
            .page_entry(page)
            .filter(|entry| entry.is_valid())
            .and_then(|entry| entry.frame());
        match frame {
            Some(frame) => {
                self.lock_frame(thread, frame);
                self.record_lock(page, thread, true);
            }
            None => {
                log::debug!("{} for {} gave up on {}: page still invalid", request, thread, page);
                self.memory_audit.record(MemoryEvent::AccessAbandoned {
                    thread,
                    page,
                    timestamp_ticks: self.now_ticks(),
                });
            }
        }
    }

    fn record_lock(&mut self, page: PageRef, thread: ThreadId, deferred: bool) {
        let Some(frame) = self.page_entry(page).and_then(|entry| entry.frame()) else {
            return;
        };
        self.memory_audit.record(MemoryEvent::PageLocked {
            page,
            frame,
            thread,
            deferred,
            timestamp_ticks: self.now_ticks(),
        });
    }
}
