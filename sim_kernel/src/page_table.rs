//! Per-task page tables
//!
//! A page table is a flat array of entries, one per virtual page. An entry
//! is valid when a frame backs it. While a fault on the page is in flight
//! the entry records the validating thread; that marker is the per-page
//! mutual exclusion for faults and is only written by the fault handler.

use core_types::{FrameId, PageNumber, PageRef, TaskId, ThreadId};

/// One page table entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageEntry {
    valid: bool,
    frame: Option<FrameId>,
    validating_thread: Option<ThreadId>,
}

impl PageEntry {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Backing frame
    ///
    /// Bound before the page becomes valid: during swap-in the frame is
    /// already recorded while `is_valid()` is still false.
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    pub fn validating_thread(&self) -> Option<ThreadId> {
        self.validating_thread
    }

    pub(crate) fn bind(&mut self, frame: FrameId) {
        self.frame = Some(frame);
    }

    /// Drops the frame and validity together
    pub(crate) fn unbind(&mut self) -> Option<FrameId> {
        self.valid = false;
        self.frame.take()
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub(crate) fn set_validating_thread(&mut self, thread: Option<ThreadId>) {
        self.validating_thread = thread;
    }
}

/// A task's page table
#[derive(Debug, Clone)]
pub struct PageTable {
    task: TaskId,
    entries: Vec<PageEntry>,
}

impl PageTable {
    /// Creates a table of `page_count` invalid entries
    pub fn new(task: TaskId, page_count: usize) -> Self {
        Self {
            task,
            entries: vec![PageEntry::default(); page_count],
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, page: PageNumber) -> Option<&PageEntry> {
        self.entries.get(page.index())
    }

    pub(crate) fn entry_mut(&mut self, page: PageNumber) -> Option<&mut PageEntry> {
        self.entries.get_mut(page.index())
    }

    /// Handle to entry `page` of this table
    pub fn page_ref(&self, page: PageNumber) -> PageRef {
        PageRef::new(self.task, page)
    }

    /// Iterates over `(page number, entry)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (PageNumber, &PageEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (PageNumber(i), entry))
    }

    /// Number of valid entries
    pub fn resident_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_all_invalid() {
        let table = PageTable::new(TaskId::new(), 8);
        assert_eq!(table.len(), 8);
        assert!(table.entries().all(|(_, e)| !e.is_valid() && e.frame().is_none()));
        assert_eq!(table.resident_count(), 0);
    }

    #[test]
    fn test_out_of_range_entry() {
        let table = PageTable::new(TaskId::new(), 4);
        assert!(table.entry(PageNumber(4)).is_none());
    }

    #[test]
    fn test_unbind_clears_validity() {
        let mut table = PageTable::new(TaskId::new(), 2);
        let entry = table.entry_mut(PageNumber(1)).unwrap();
        entry.bind(FrameId(3));
        entry.set_valid(true);
        assert_eq!(entry.unbind(), Some(FrameId(3)));
        assert!(!entry.is_valid());
        assert_eq!(entry.frame(), None);
    }

    #[test]
    fn test_page_ref_carries_owner() {
        let task = TaskId::new();
        let table = PageTable::new(task, 2);
        assert_eq!(table.page_ref(PageNumber(1)), PageRef::new(task, PageNumber(1)));
    }
}
