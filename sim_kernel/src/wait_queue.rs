//! Event wait lists
//!
//! Every suspension registers the thread on exactly one event. A thread
//! waiting at depth `n` therefore holds `n` registrations. Notifying an event
//! releases all of its waiters in one burst, in arrival order.

use core_types::{PageRef, ReferenceKind, ThreadId};
use kernel_api::{EventId, IoRequestId};
use std::collections::HashMap;

/// Work a waiter still has to do once its event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Continuation {
    None,
    /// A memory reference that found the page mid-fault
    Access {
        page: PageRef,
        kind: ReferenceKind,
        /// Byte to store at this offset once the page is resident
        store: Option<(usize, u8)>,
    },
    /// A lock request that found the page mid-fault
    Lock { page: PageRef, request: IoRequestId },
}

#[derive(Debug, Clone)]
pub(crate) struct Waiter {
    pub thread: ThreadId,
    pub continuation: Continuation,
    seq: u64,
}

#[derive(Debug, Default)]
pub(crate) struct WaitQueues {
    lists: HashMap<EventId, Vec<Waiter>>,
    next_seq: u64,
}

impl WaitQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: EventId, thread: ThreadId, continuation: Continuation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lists.entry(event).or_default().push(Waiter {
            thread,
            continuation,
            seq,
        });
    }

    /// Removes and returns every waiter on `event`
    pub fn take_all(&mut self, event: EventId) -> Vec<Waiter> {
        self.lists.remove(&event).unwrap_or_default()
    }

    /// Drops every registration of `thread`
    pub fn remove_thread(&mut self, thread: ThreadId) -> usize {
        let mut removed = 0;
        self.lists.retain(|_, waiters| {
            let before = waiters.len();
            waiters.retain(|w| w.thread != thread);
            removed += before - waiters.len();
            !waiters.is_empty()
        });
        removed
    }

    /// Drops the most recent registration of `thread`
    pub fn remove_latest(&mut self, thread: ThreadId) -> Option<Waiter> {
        let (event, index) = self
            .lists
            .iter()
            .flat_map(|(event, waiters)| {
                waiters
                    .iter()
                    .enumerate()
                    .filter(|(_, w)| w.thread == thread)
                    .map(move |(i, w)| (*event, i, w.seq))
            })
            .max_by_key(|(_, _, seq)| *seq)
            .map(|(event, i, _)| (event, i))?;

        let waiters = self.lists.get_mut(&event)?;
        let waiter = waiters.remove(index);
        if waiters.is_empty() {
            self.lists.remove(&event);
        }
        Some(waiter)
    }

    /// Threads waiting on `event`, in arrival order
    pub fn waiters(&self, event: EventId) -> Vec<ThreadId> {
        self.lists
            .get(&event)
            .map(|waiters| waiters.iter().map(|w| w.thread).collect())
            .unwrap_or_default()
    }

    /// Number of events `thread` is registered on
    pub fn registrations(&self, thread: ThreadId) -> usize {
        self.lists
            .values()
            .flat_map(|waiters| waiters.iter())
            .filter(|w| w.thread == thread)
            .count()
    }
}
