//! Page fault handling
//!
//! A fault runs to completion on the faulting thread's stack. The thread is
//! suspended on the fault's own completion event for the whole resolution
//! and, nested inside that, on each swap transfer. While a transfer is
//! outstanding the rest of the system gets to run, so every step after a
//! transfer re-checks whether the faulting thread is still alive.
//!
//! The page's validating-thread marker is set for the duration; other
//! threads that reference the page meanwhile wait on the page itself and are
//! released when the fault ends, whatever its outcome.

use crate::memory_audit::{FaultOutcome, MemoryEvent};
use crate::wait_queue::Continuation;
use crate::SimulatedKernel;
use core_types::{FrameId, PageRef, ReferenceKind, ThreadId};
use kernel_api::{Access, EventId, FaultId, IoRequest, IoRequestId, KernelError, TransferDirection};

/// Bookkeeping for one fault, consumed by the cleanup path
#[derive(Debug)]
struct FaultState {
    fault: FaultId,
    thread: ThreadId,
    page: PageRef,
    kind: ReferenceKind,
    /// Frame reserved for the page once one has been chosen
    frame: Option<FrameId>,
    /// Whether the validating marker was set and the thread suspended
    started: bool,
}

impl SimulatedKernel {
    /// Makes `page` valid on behalf of `thread`
    ///
    /// Returns `PageAlreadyValid` if there is nothing to do, `NotEnoughMemory`
    /// if every frame is locked or reserved, and `ThreadKilled` if the
    /// thread died while the fault was in flight. Every outcome releases the
    /// page's waiters and ends with a single dispatch.
    pub(crate) fn handle_page_fault(
        &mut self,
        thread: ThreadId,
        kind: ReferenceKind,
        page: PageRef,
    ) -> Result<(), KernelError> {
        let fault = FaultId(self.next_fault);
        self.next_fault += 1;

        let mut state = FaultState {
            fault,
            thread,
            page,
            kind,
            frame: None,
            started: false,
        };
        let result = self
            .check_fault_preconditions(page)
            .and_then(|()| self.resolve_fault(&mut state));
        self.finish_fault(&state, &result);
        result
    }

    fn check_fault_preconditions(&self, page: PageRef) -> Result<(), KernelError> {
        let entry = self
            .page_entry(page)
            .ok_or(KernelError::UnknownTask(page.task))?;
        if entry.is_valid() {
            return Err(KernelError::PageAlreadyValid(page));
        }
        if !self.frames.has_evictable() {
            log::warn!("fault on {}: every frame is locked or reserved", page);
            return Err(KernelError::NotEnoughMemory);
        }
        Ok(())
    }

    fn resolve_fault(&mut self, state: &mut FaultState) -> Result<(), KernelError> {
        let FaultState {
            fault,
            thread,
            page,
            kind,
            ..
        } = *state;

        if let Some(entry) = self.page_entry_mut(page) {
            entry.set_validating_thread(Some(thread));
        }
        state.started = true;
        self.memory_audit.record(MemoryEvent::FaultStarted {
            fault,
            thread,
            page,
            kind,
            timestamp_ticks: self.now_ticks(),
        });
        self.suspend_on(thread, EventId::FaultCompletion(fault), Continuation::None)?;

        let (frame, victim) = match self.frames.find_free() {
            Some(frame) => (frame, false),
            None => (
                self.frames
                    .select_victim()
                    .ok_or(KernelError::NotEnoughMemory)?,
                true,
            ),
        };
        self.frames.reserve(frame, page.task);
        state.frame = Some(frame);
        self.memory_audit.record(MemoryEvent::FrameAssigned {
            fault,
            frame,
            victim,
            timestamp_ticks: self.now_ticks(),
        });

        let resident = self.frames.get(frame).and_then(|f| f.page());
        if let Some(old_page) = resident {
            let dirty = self.frames.get(frame).is_some_and(|f| f.is_dirty());
            if dirty {
                self.transfer(thread, old_page, frame, TransferDirection::SwapOut)?;
                if self.scheduler.is_killed(thread) {
                    return Err(KernelError::ThreadKilled(thread));
                }
            }
            // The owner may have died during the swap-out
            if let Some(evicted) = self.frames.clear(frame) {
                if let Some(entry) = self.page_entry_mut(evicted) {
                    entry.unbind();
                }
                log::debug!("evicted {} from {}", evicted, frame);
                self.memory_audit.record(MemoryEvent::PageEvicted {
                    frame,
                    page: evicted,
                    timestamp_ticks: self.now_ticks(),
                });
            }
        }

        self.frames.bind(frame, page);
        if let Some(entry) = self.page_entry_mut(page) {
            entry.bind(frame);
        }
        self.transfer(thread, page, frame, TransferDirection::SwapIn)?;
        if self.scheduler.is_killed(thread) {
            return Err(KernelError::ThreadKilled(thread));
        }

        if let Some(entry) = self.page_entry_mut(page) {
            entry.set_valid(true);
        }
        if let Some(f) = self.frames.get_mut(frame) {
            f.set_dirty(kind.is_write());
        }
        self.frames.release_reservation(frame, page.task);
        Ok(())
    }

    /// Single exit for every fault outcome
    ///
    /// On failure the reservation is dropped and a half-installed binding is
    /// undone. Either way the page's waiters and the fault's own waiters are
    /// released, the validating marker is cleared and the processor is
    /// dispatched once.
    fn finish_fault(&mut self, state: &FaultState, result: &Result<(), KernelError>) {
        let page = state.page;
        if result.is_err() {
            if let Some(frame) = state.frame {
                self.frames.release_reservation(frame, page.task);
                let installing = self.frames.get(frame).and_then(|f| f.page()) == Some(page);
                let valid = self.page_entry(page).is_some_and(|e| e.is_valid());
                if installing && !valid {
                    self.frames.clear(frame);
                    if let Some(entry) = self.page_entry_mut(page) {
                        entry.unbind();
                    }
                }
            }
        }

        self.notify(EventId::Page(page));
        if state.started {
            self.notify(EventId::FaultCompletion(state.fault));
            if let Some(entry) = self.page_entry_mut(page) {
                entry.set_validating_thread(None);
            }
        }

        let outcome = match result {
            Ok(()) => FaultOutcome::Installed,
            Err(KernelError::PageAlreadyValid(_)) => FaultOutcome::AlreadyValid,
            Err(KernelError::NotEnoughMemory) => FaultOutcome::NotEnoughMemory,
            Err(_) => FaultOutcome::Failed,
        };
        log::debug!("fault on {} by {}: {:?}", page, state.thread, outcome);
        self.memory_audit.record(MemoryEvent::FaultFinished {
            fault: state.fault,
            page,
            outcome,
            timestamp_ticks: self.now_ticks(),
        });

        self.dispatch_next();
    }

    /// Moves one page between `frame` and its swap slot, blocking `thread`
    ///
    /// The page is pinned by `thread` for the duration. A request purged by a kill
    /// moves no data; callers check the thread's status afterwards.
    fn transfer(
        &mut self,
        thread: ThreadId,
        page: PageRef,
        frame: FrameId,
        direction: TransferDirection,
    ) -> Result<(), KernelError> {
        let id = IoRequestId(self.next_request);
        self.next_request += 1;
        let request = IoRequest {
            id,
            thread,
            page,
            slot: page.swap_slot(),
            direction,
        };

        let pinned = matches!(self.pin_page(page, &request), Ok(Access::Resolved(())));
        self.devices.enqueue(request);
        self.memory_audit.record(MemoryEvent::TransferStarted {
            request: id,
            direction,
            page,
            frame,
            timestamp_ticks: self.now_ticks(),
        });

        if let Err(err) = self.suspend_on(thread, EventId::Io(id), Continuation::None) {
            self.devices.complete(id);
            if pinned {
                self.release_pin(thread, frame);
            }
            return Err(err);
        }

        self.interleave(&request);
        let latency = self.config.memory.swap_latency_ticks;
        self.run_clock(latency);

        let serviced = self.devices.complete(id);
        if serviced {
            match direction {
                TransferDirection::SwapOut => {
                    if let Some(f) = self.frames.get(frame) {
                        self.backing_store.write(&request, f.contents());
                    }
                }
                TransferDirection::SwapIn => {
                    if let Some(f) = self.frames.get_mut(frame) {
                        self.backing_store.read(&request, f.contents_mut());
                    }
                }
            }
        }
        // A kill during the transfer already dropped the pin
        if pinned {
            self.release_pin(thread, frame);
        }
        self.memory_audit.record(MemoryEvent::TransferFinished {
            request: id,
            direction,
            serviced,
            timestamp_ticks: self.now_ticks(),
        });

        self.notify(EventId::Io(id));
        Ok(())
    }

    /// Lets the rest of the system run while `request` is outstanding
    fn interleave(&mut self, request: &IoRequest) {
        if let Some(mut injector) = self.fault_injector.take() {
            let victims = injector.on_transfer(request);
            self.fault_injector = Some(injector);
            for victim in victims {
                if let Err(err) = self.terminate_thread(victim) {
                    log::debug!("injected kill of {} skipped: {}", victim, err);
                }
            }
        }

        if let Some(mut hook) = self.io_interleaver.take() {
            hook(self, request);
            if self.io_interleaver.is_none() {
                self.io_interleaver = Some(hook);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::memory_audit::{FaultOutcome, MemoryEvent};
    use crate::test_utils::{page_address, small_kernel};
    use core_types::{FrameId, PageNumber, PageRef, ReferenceKind};
    use kernel_api::{Access, ErrorKind, KernelApi, KernelError};

    #[test]
    fn test_fault_installs_into_free_frame() {
        let (mut kernel, task, thread) = small_kernel(2);
        let page = PageRef::new(task, PageNumber(0));

        kernel.handle_page_fault(thread, ReferenceKind::Read, page).unwrap();

        let entry = kernel.page_entry(page).unwrap();
        assert!(entry.is_valid());
        assert_eq!(entry.frame(), Some(FrameId(0)));
        assert_eq!(entry.validating_thread(), None);
        let frame = kernel.frame(FrameId(0)).unwrap();
        assert_eq!(frame.page(), Some(page));
        assert!(!frame.is_reserved());
        assert!(!frame.is_dirty());
        assert_eq!(frame.lock_count(), 0);
        assert_eq!(kernel.current_thread(), Some(thread));
    }

    #[test]
    fn test_write_fault_marks_dirty() {
        let (mut kernel, task, thread) = small_kernel(2);
        let page = PageRef::new(task, PageNumber(3));

        kernel.handle_page_fault(thread, ReferenceKind::Write, page).unwrap();
        let frame = kernel.page_entry(page).unwrap().frame().unwrap();
        assert!(kernel.frame(frame).unwrap().is_dirty());
    }

    #[test]
    fn test_fault_on_valid_page() {
        let (mut kernel, task, thread) = small_kernel(2);
        let page = PageRef::new(task, PageNumber(0));
        kernel.refer(0, ReferenceKind::Read, thread).unwrap();

        let err = kernel
            .handle_page_fault(thread, ReferenceKind::Read, page)
            .unwrap_err();
        assert_eq!(err, KernelError::PageAlreadyValid(page));
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(kernel.memory_audit().has_event(|e| matches!(
            e,
            MemoryEvent::FaultFinished {
                outcome: FaultOutcome::AlreadyValid,
                ..
            }
        )));
    }

    #[test]
    fn test_clean_victim_is_not_written_back() {
        let (mut kernel, task, thread) = small_kernel(1);
        kernel.refer(page_address(&kernel, 0), ReferenceKind::Read, thread).unwrap();
        kernel.refer(page_address(&kernel, 1), ReferenceKind::Read, thread).unwrap();

        assert!(!kernel.page_entry(PageRef::new(task, PageNumber(0))).unwrap().is_valid());
        assert_eq!(
            kernel.memory_audit().count_events(|e| matches!(
                e,
                MemoryEvent::TransferStarted {
                    direction: kernel_api::TransferDirection::SwapOut,
                    ..
                }
            )),
            0
        );
    }

    #[test]
    fn test_dirty_victim_is_written_back() {
        let (mut kernel, task, thread) = small_kernel(1);
        kernel.store_byte(page_address(&kernel, 0) + 1, 9, thread).unwrap();
        kernel.refer(page_address(&kernel, 1), ReferenceKind::Read, thread).unwrap();

        let old = PageRef::new(task, PageNumber(0));
        assert!(!kernel.page_entry(old).unwrap().is_valid());
        assert!(kernel.memory_audit().has_event(|e| matches!(
            e,
            MemoryEvent::PageEvicted { page, .. } if *page == old
        )));
        assert_eq!(kernel.load_byte(page_address(&kernel, 0) + 1, thread), Ok(Access::Resolved(9)));
    }

    #[test]
    fn test_swap_takes_simulated_time() {
        let (mut kernel, _, thread) = small_kernel(2);
        let before = kernel.now();
        kernel.refer(0, ReferenceKind::Read, thread).unwrap();
        let latency = kernel.config().memory.swap_latency_ticks;
        assert_eq!(kernel.now().duration_since(before).as_ticks(), latency);
    }
}
