//! Physical frame inventory
//!
//! One entry per physical frame, allocated once when the kernel boots and
//! never deallocated. A frame cycles between free, reserved for an in-flight
//! fault and resident. The resident page is held as a [`PageRef`] handle;
//! the page table holds the matching [`FrameId`].
//!
//! Victim selection is an approximate FIFO: a single cursor sweeps the
//! table and passes over frames that are locked or reserved.

use core_types::{FrameId, PageRef, TaskId};
use serde::{Deserialize, Serialize};

/// A physical frame
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    page: Option<PageRef>,
    referenced: bool,
    dirty: bool,
    lock_count: u32,
    reserved_by: Option<TaskId>,
    contents: Box<[u8]>,
}

impl Frame {
    fn new(id: FrameId, page_size: usize) -> Self {
        Self {
            id,
            page: None,
            referenced: false,
            dirty: false,
            lock_count: 0,
            reserved_by: None,
            contents: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Page currently resident in this frame
    pub fn page(&self) -> Option<PageRef> {
        self.page
    }

    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    pub fn reserved_by(&self) -> Option<TaskId> {
        self.reserved_by
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }

    /// Free: nothing resident and nobody has claimed it
    pub fn is_free(&self) -> bool {
        self.page.is_none() && self.reserved_by.is_none()
    }

    /// Can be chosen as an eviction victim
    pub fn is_evictable(&self) -> bool {
        self.lock_count == 0 && self.reserved_by.is_none()
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub(crate) fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.contents
    }

    /// Marks an access; dirty is only ever set, never cleared, here
    pub(crate) fn touch(&mut self, write: bool) {
        self.referenced = true;
        if write {
            self.dirty = true;
        }
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}

/// Snapshot of one frame for audits and debugging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub id: FrameId,
    pub page: Option<PageRef>,
    pub referenced: bool,
    pub dirty: bool,
    pub lock_count: u32,
    pub reserved_by: Option<TaskId>,
}

/// The frame table
#[derive(Debug)]
pub struct FrameTable {
    frames: Vec<Frame>,
    /// Next FIFO candidate
    cursor: usize,
}

impl FrameTable {
    /// Builds a table of `count` free frames of `page_size` bytes
    pub fn new(count: usize, page_size: usize) -> Self {
        Self {
            frames: (0..count).map(|i| Frame::new(FrameId(i), page_size)).collect(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Position of the FIFO cursor
    pub fn cursor(&self) -> FrameId {
        FrameId(self.cursor)
    }

    /// First frame with nothing resident and no reservation
    pub fn find_free(&self) -> Option<FrameId> {
        self.frames.iter().find(|f| f.is_free()).map(|f| f.id)
    }

    /// True if at least one frame is neither locked nor reserved
    pub fn has_evictable(&self) -> bool {
        self.frames.iter().any(Frame::is_evictable)
    }

    /// Picks the next eviction victim
    ///
    /// Starting at the cursor, locked or reserved frames are skipped and the
    /// cursor moves past each of them. The cursor then steps once more past
    /// the chosen frame. Returns `None` when no frame is evictable.
    pub fn select_victim(&mut self) -> Option<FrameId> {
        if !self.has_evictable() {
            return None;
        }
        let count = self.frames.len();
        while !self.frames[self.cursor].is_evictable() {
            self.cursor = (self.cursor + 1) % count;
        }
        let victim = FrameId(self.cursor);
        self.cursor = (self.cursor + 1) % count;
        Some(victim)
    }

    pub(crate) fn reserve(&mut self, id: FrameId, task: TaskId) {
        if let Some(frame) = self.get_mut(id) {
            frame.reserved_by = Some(task);
        }
    }

    /// Drops the reservation if `task` holds it
    pub(crate) fn release_reservation(&mut self, id: FrameId, task: TaskId) {
        if let Some(frame) = self.get_mut(id) {
            if frame.reserved_by == Some(task) {
                frame.reserved_by = None;
            }
        }
    }

    pub(crate) fn lock(&mut self, id: FrameId) {
        if let Some(frame) = self.get_mut(id) {
            frame.lock_count = frame.lock_count.saturating_add(1);
        }
    }

    /// Decrements the lock count, stopping at zero
    pub(crate) fn unlock(&mut self, id: FrameId) {
        if let Some(frame) = self.get_mut(id) {
            frame.lock_count = frame.lock_count.saturating_sub(1);
        }
    }

    /// Records `page` as resident in frame `id`
    pub(crate) fn bind(&mut self, id: FrameId, page: PageRef) {
        if let Some(frame) = self.get_mut(id) {
            frame.page = Some(page);
        }
    }

    /// Empties the frame: no resident page, access bits cleared
    ///
    /// Returns the page that was resident. Lock count and reservation are
    /// left alone.
    pub(crate) fn clear(&mut self, id: FrameId) -> Option<PageRef> {
        let frame = self.get_mut(id)?;
        frame.referenced = false;
        frame.dirty = false;
        frame.page.take()
    }

    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        self.frames
            .iter()
            .map(|f| FrameSnapshot {
                id: f.id,
                page: f.page,
                referenced: f.referenced,
                dirty: f.dirty,
                lock_count: f.lock_count,
                reserved_by: f.reserved_by,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::PageNumber;

    fn page(task: TaskId, n: usize) -> PageRef {
        PageRef::new(task, PageNumber(n))
    }

    #[test]
    fn test_new_table_is_free() {
        let table = FrameTable::new(4, 64);
        assert_eq!(table.len(), 4);
        assert!(table.iter().all(Frame::is_free));
        assert_eq!(table.find_free(), Some(FrameId(0)));
        assert_eq!(table.get(FrameId(2)).unwrap().contents().len(), 64);
    }

    #[test]
    fn test_find_free_skips_resident_and_reserved() {
        let task = TaskId::new();
        let mut table = FrameTable::new(3, 16);
        table.bind(FrameId(0), page(task, 0));
        table.reserve(FrameId(1), task);
        assert_eq!(table.find_free(), Some(FrameId(2)));
    }

    #[test]
    fn test_fifo_order_without_locks() {
        let mut table = FrameTable::new(3, 16);
        assert_eq!(table.select_victim(), Some(FrameId(0)));
        assert_eq!(table.select_victim(), Some(FrameId(1)));
        assert_eq!(table.select_victim(), Some(FrameId(2)));
        assert_eq!(table.select_victim(), Some(FrameId(0)));
    }

    #[test]
    fn test_fifo_skips_locked_and_reserved() {
        let task = TaskId::new();
        let mut table = FrameTable::new(4, 16);
        table.lock(FrameId(0));
        table.reserve(FrameId(1), task);

        assert_eq!(table.select_victim(), Some(FrameId(2)));
        assert_eq!(table.cursor(), FrameId(3));
        assert_eq!(table.select_victim(), Some(FrameId(3)));
        // Wraps past the pinned frames again
        assert_eq!(table.select_victim(), Some(FrameId(2)));
    }

    #[test]
    fn test_single_evictable_frame_is_reoffered() {
        let task = TaskId::new();
        let mut table = FrameTable::new(3, 16);
        table.lock(FrameId(0));
        table.lock(FrameId(2));
        table.reserve(FrameId(0), task);

        assert_eq!(table.select_victim(), Some(FrameId(1)));
        assert_eq!(table.select_victim(), Some(FrameId(1)));
    }

    #[test]
    fn test_no_victim_when_everything_pinned() {
        let mut table = FrameTable::new(2, 16);
        table.lock(FrameId(0));
        table.lock(FrameId(1));
        assert!(!table.has_evictable());
        assert_eq!(table.select_victim(), None);
        assert_eq!(table.cursor(), FrameId(0));
    }

    #[test]
    fn test_unlock_clamps_at_zero() {
        let mut table = FrameTable::new(1, 16);
        table.unlock(FrameId(0));
        assert_eq!(table.get(FrameId(0)).unwrap().lock_count(), 0);
        table.lock(FrameId(0));
        table.unlock(FrameId(0));
        table.unlock(FrameId(0));
        assert_eq!(table.get(FrameId(0)).unwrap().lock_count(), 0);
    }

    #[test]
    fn test_release_reservation_only_by_owner() {
        let owner = TaskId::new();
        let other = TaskId::new();
        let mut table = FrameTable::new(1, 16);
        table.reserve(FrameId(0), owner);
        table.release_reservation(FrameId(0), other);
        assert_eq!(table.get(FrameId(0)).unwrap().reserved_by(), Some(owner));
        table.release_reservation(FrameId(0), owner);
        assert!(!table.get(FrameId(0)).unwrap().is_reserved());
    }

    #[test]
    fn test_clear_resets_bits() {
        let task = TaskId::new();
        let mut table = FrameTable::new(1, 16);
        table.bind(FrameId(0), page(task, 5));
        table.get_mut(FrameId(0)).unwrap().touch(true);
        table.lock(FrameId(0));

        assert_eq!(table.clear(FrameId(0)), Some(page(task, 5)));
        let frame = table.get(FrameId(0)).unwrap();
        assert!(!frame.is_dirty());
        assert!(!frame.is_referenced());
        assert_eq!(frame.lock_count(), 1);
    }
}
