//! Consistency checks over the whole kernel state
//!
//! Meant for tests: after any sequence of operations the frame table, the
//! page tables, the ready queues and the wait lists must agree with each
//! other. A frame may be bound to an invalid page only while a fault on
//! that page is installing it. Every pin belongs to a live thread.

use crate::scheduler::ThreadStatus;
use crate::SimulatedKernel;
use core_types::{FrameId, PageRef, TaskId, ThreadId};
use thiserror::Error;

/// A broken cross-structure invariant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("{page} is valid but has no frame")]
    ValidWithoutFrame { page: PageRef },

    #[error("{page} points at {frame}, which holds {found:?}")]
    FrameDisagrees {
        page: PageRef,
        frame: FrameId,
        found: Option<PageRef>,
    },

    #[error("{frame} holds {page}, whose entry points at {found:?}")]
    PageDisagrees {
        frame: FrameId,
        page: PageRef,
        found: Option<FrameId>,
    },

    #[error("{page} is bound to {frame} but invalid with no fault in flight")]
    BoundButInvalid { page: PageRef, frame: FrameId },

    #[error("{thread} is {status:?} but sits in {queued} ready queue slots, {waits} wait lists, running: {running}")]
    ThreadMisplaced {
        thread: ThreadId,
        status: ThreadStatus,
        queued: usize,
        waits: usize,
        running: bool,
    },

    #[error("{frame} has lock count {lock_count} but {pins} recorded pins")]
    LockCountMismatch {
        frame: FrameId,
        lock_count: u32,
        pins: usize,
    },

    #[error("{thread} is dead but still pins {pins} frames")]
    DeadThreadPins { thread: ThreadId, pins: usize },

    #[error("active page table belongs to {active:?}, running thread belongs to {expected:?}")]
    ActiveTableMismatch {
        active: Option<TaskId>,
        expected: Option<TaskId>,
    },
}

impl SimulatedKernel {
    /// Verifies the frame/page binding and thread placement invariants
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.check_page_bindings()?;
        self.check_frame_bindings()?;
        self.check_thread_placement()?;
        self.check_pins()?;
        self.check_active_table()
    }

    fn check_page_bindings(&self) -> Result<(), InvariantViolation> {
        for info in self.tasks.values() {
            let table = &info.page_table;
            for (number, entry) in table.entries() {
                let page = table.page_ref(number);
                let Some(frame) = entry.frame() else {
                    if entry.is_valid() {
                        return Err(InvariantViolation::ValidWithoutFrame { page });
                    }
                    continue;
                };

                let found = self.frames.get(frame).and_then(|f| f.page());
                if found != Some(page) {
                    return Err(InvariantViolation::FrameDisagrees { page, frame, found });
                }
                if !entry.is_valid() && entry.validating_thread().is_none() {
                    return Err(InvariantViolation::BoundButInvalid { page, frame });
                }
            }
        }
        Ok(())
    }

    fn check_frame_bindings(&self) -> Result<(), InvariantViolation> {
        for frame in self.frames.iter() {
            let Some(page) = frame.page() else {
                continue;
            };
            let found = self.page_entry(page).and_then(|entry| entry.frame());
            if found != Some(frame.id()) {
                return Err(InvariantViolation::PageDisagrees {
                    frame: frame.id(),
                    page,
                    found,
                });
            }
        }
        Ok(())
    }

    fn check_thread_placement(&self) -> Result<(), InvariantViolation> {
        let high = self.scheduler.high_queue();
        let low = self.scheduler.low_queue();
        let current = self.scheduler.current();

        for (thread, status) in self.scheduler.threads() {
            let queued = high.iter().chain(low.iter()).filter(|t| **t == thread).count();
            let waits = self.waits.registrations(thread);
            let running = current == Some(thread);

            let placed = match status {
                ThreadStatus::Ready => queued == 1 && waits == 0 && !running,
                ThreadStatus::Running => queued == 0 && waits == 0 && running,
                ThreadStatus::Waiting(depth) => {
                    queued == 0 && !running && waits == depth.get() as usize
                }
                ThreadStatus::Killed => queued == 0 && waits == 0 && !running,
            };
            if !placed {
                return Err(InvariantViolation::ThreadMisplaced {
                    thread,
                    status,
                    queued,
                    waits,
                    running,
                });
            }
        }
        Ok(())
    }

    fn check_pins(&self) -> Result<(), InvariantViolation> {
        for frame in self.frames.iter() {
            let pins = self.pins.count_on(frame.id());
            if frame.lock_count() as usize != pins {
                return Err(InvariantViolation::LockCountMismatch {
                    frame: frame.id(),
                    lock_count: frame.lock_count(),
                    pins,
                });
            }
        }
        for (thread, status) in self.scheduler.threads() {
            let pins = self.pins.held_by(thread).len();
            if status == ThreadStatus::Killed && pins > 0 {
                return Err(InvariantViolation::DeadThreadPins { thread, pins });
            }
        }
        Ok(())
    }

    fn check_active_table(&self) -> Result<(), InvariantViolation> {
        let expected = self
            .scheduler
            .current()
            .and_then(|thread| self.scheduler.task_of(thread));
        let active = self.mmu.active();
        if active != expected {
            return Err(InvariantViolation::ActiveTableMismatch { active, expected });
        }
        Ok(())
    }
}
