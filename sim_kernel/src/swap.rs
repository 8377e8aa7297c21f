//! In-memory swap device
//!
//! Holds one page-sized buffer per swap slot. A slot is created on its first
//! write; reading a slot that was never written yields zeroes, which is what
//! a fresh page looks like the first time it is faulted in.

use core_types::SwapSlot;
use kernel_api::{BackingStore, IoRequest};
use std::collections::HashMap;

/// Simulated swap device
#[derive(Debug, Clone, Default)]
pub struct SimSwapDevice {
    slots: HashMap<SwapSlot, Vec<u8>>,
    reads: u64,
    writes: u64,
}

impl SimSwapDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored contents of `slot`, if it was ever written
    pub fn slot(&self, slot: SwapSlot) -> Option<&[u8]> {
        self.slots.get(&slot).map(Vec::as_slice)
    }

    /// Number of completed swap-ins
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of completed swap-outs
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl BackingStore for SimSwapDevice {
    fn read(&mut self, request: &IoRequest, buf: &mut [u8]) {
        self.reads += 1;
        match self.slots.get(&request.slot) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                buf[len..].fill(0);
            }
            None => buf.fill(0),
        }
    }

    fn write(&mut self, request: &IoRequest, data: &[u8]) {
        self.writes += 1;
        self.slots.insert(request.slot, data.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{PageNumber, PageRef, TaskId, ThreadId};
    use kernel_api::{IoRequestId, TransferDirection};

    fn request(page: PageRef, direction: TransferDirection) -> IoRequest {
        IoRequest {
            id: IoRequestId(1),
            thread: ThreadId::new(),
            page,
            slot: page.swap_slot(),
            direction,
        }
    }

    #[test]
    fn test_unwritten_slot_reads_zero() {
        let mut device = SimSwapDevice::new();
        let page = PageRef::new(TaskId::new(), PageNumber(3));
        let mut buf = vec![0xAAu8; 8];

        device.read(&request(page, TransferDirection::SwapIn), &mut buf);
        assert!(buf.iter().all(|b| *b == 0));
        assert_eq!(device.reads(), 1);
        assert_eq!(device.slot_count(), 0);
    }

    #[test]
    fn test_slots_are_per_task() {
        let mut device = SimSwapDevice::new();
        let a = PageRef::new(TaskId::new(), PageNumber(0));
        let b = PageRef::new(TaskId::new(), PageNumber(0));

        device.write(&request(a, TransferDirection::SwapOut), &[1, 2, 3]);
        device.write(&request(b, TransferDirection::SwapOut), &[9, 9, 9]);

        let mut buf = [0u8; 3];
        device.read(&request(a, TransferDirection::SwapIn), &mut buf);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(device.slot(b.swap_slot()), Some(&[9u8, 9, 9][..]));
        assert_eq!(device.writes(), 2);
    }
}
