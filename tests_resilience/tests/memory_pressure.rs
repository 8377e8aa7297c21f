//! Memory Pressure Tests
//!
//! Validates FIFO replacement, write-back of dirty victims, and the
//! behavior when no frame can be given up.

use core_types::{FrameId, ReferenceKind};
use kernel_api::{Access, ErrorKind, EventId, KernelApi, KernelError, TransferDirection};
use sim_kernel::memory_audit::{FaultOutcome, MemoryEvent};
use sim_kernel::test_utils::{io_request, page_address, switch_to};
use std::cell::RefCell;
use std::rc::Rc;
use tests_resilience::{assert_consistent, frame_state, page, test_bootstrap, touch_pages};

// ============================================================================
// Exhaustion
// ============================================================================

/// Test: Every frame locked
///
/// This validates that:
/// 1. The fault reports NotEnoughMemory
/// 2. No frame changes state, including the FIFO cursor
/// 3. The page is left invalid with no fault marked in flight
#[test]
fn test_all_frames_locked() {
    let (mut kernel, task, thread) = test_bootstrap(2);
    touch_pages(&mut kernel, thread, 2, ReferenceKind::Read).unwrap();
    for n in 0..2 {
        let pin = io_request(thread, page(task, n), TransferDirection::SwapOut);
        kernel.lock_page(page(task, n), &pin).unwrap();
    }
    let before = frame_state(&kernel);
    let cursor = kernel.frames().cursor();

    let address = page_address(&kernel, 2);
    let err = kernel.refer(address, ReferenceKind::Read, thread).unwrap_err();
    assert_eq!(err, KernelError::NotEnoughMemory);
    assert_eq!(err.kind(), ErrorKind::NotEnoughMemory);

    assert_eq!(frame_state(&kernel), before);
    assert_eq!(kernel.frames().cursor(), cursor);
    let entry = kernel.page_entry(page(task, 2)).unwrap();
    assert!(!entry.is_valid());
    assert_eq!(entry.validating_thread(), None);
    assert_eq!(kernel.current_thread(), Some(thread));
    assert!(kernel.memory_audit().has_event(|e| matches!(
        e,
        MemoryEvent::FaultFinished {
            outcome: FaultOutcome::NotEnoughMemory,
            ..
        }
    )));
    assert_consistent(&kernel);

    // Unpinning one frame makes room again
    kernel.unlock_page(page(task, 0));
    assert!(kernel.refer(address, ReferenceKind::Read, thread).is_ok());
}

/// Test: A frame reserved by a fault in flight is not a candidate
#[test]
fn test_reserved_frame_is_not_evictable() {
    let (mut kernel, task, t1) = test_bootstrap(2);
    let t2 = kernel.create_thread(task).unwrap();
    assert!(switch_to(&mut kernel, t1));

    kernel.refer(0, ReferenceKind::Read, t1).unwrap();
    let pin = io_request(t1, page(task, 0), TransferDirection::SwapOut);
    kernel.lock_page(page(task, 0), &pin).unwrap();

    let address = page_address(&kernel, 2);
    let second = Rc::new(RefCell::new(None));
    let hook_second = Rc::clone(&second);
    kernel.set_io_interleaver(move |kernel, _| {
        *hook_second.borrow_mut() = Some(kernel.refer(address, ReferenceKind::Read, t2));
    });

    // Frame 1 is free but reserved while page 1 is read in
    kernel.refer(page_address(&kernel, 1), ReferenceKind::Read, t1).unwrap();
    assert_eq!(*second.borrow(), Some(Err(KernelError::NotEnoughMemory)));
    assert!(!kernel.page_entry(page(task, 2)).unwrap().is_valid());
    assert_consistent(&kernel);
}

// ============================================================================
// Replacement
// ============================================================================

/// Test: The (N+1)-th fault evicts the first page brought in
#[test]
fn test_fifo_replacement_order() {
    let frames = 3;
    let (mut kernel, task, thread) = test_bootstrap(frames);
    touch_pages(&mut kernel, thread, frames, ReferenceKind::Read).unwrap();

    kernel
        .refer(page_address(&kernel, 3), ReferenceKind::Read, thread)
        .unwrap();
    assert!(!kernel.page_entry(page(task, 0)).unwrap().is_valid());
    assert_eq!(
        kernel.page_entry(page(task, 3)).unwrap().frame(),
        Some(FrameId(0))
    );

    kernel
        .refer(page_address(&kernel, 4), ReferenceKind::Read, thread)
        .unwrap();
    assert!(!kernel.page_entry(page(task, 1)).unwrap().is_valid());
    assert_eq!(
        kernel.page_entry(page(task, 4)).unwrap().frame(),
        Some(FrameId(1))
    );
    assert_consistent(&kernel);
}

/// Test: Locked frames are skipped and the sweep continues past them
#[test]
fn test_fifo_skips_locked_frame() {
    let (mut kernel, task, thread) = test_bootstrap(3);
    touch_pages(&mut kernel, thread, 3, ReferenceKind::Read).unwrap();
    let pin = io_request(thread, page(task, 0), TransferDirection::SwapOut);
    kernel.lock_page(page(task, 0), &pin).unwrap();

    kernel
        .refer(page_address(&kernel, 5), ReferenceKind::Read, thread)
        .unwrap();
    assert!(kernel.page_entry(page(task, 0)).unwrap().is_valid());
    assert!(!kernel.page_entry(page(task, 1)).unwrap().is_valid());
    assert_eq!(kernel.frames().cursor(), FrameId(2));
    assert_consistent(&kernel);
}

// ============================================================================
// Contents
// ============================================================================

/// Test: Data written to a page survives eviction and reload
#[test]
fn test_swap_round_trip() {
    let (mut kernel, _, thread) = test_bootstrap(2);
    let pages = 6;

    for n in 0..pages {
        let address = page_address(&kernel, n) + n as u64;
        kernel.store_byte(address, 0x40 + n as u8, thread).unwrap();
    }
    for n in 0..pages {
        let address = page_address(&kernel, n) + n as u64;
        assert_eq!(
            kernel.load_byte(address, thread),
            Ok(Access::Resolved(0x40 + n as u8)),
            "page {} lost its data",
            n
        );
    }
    assert_consistent(&kernel);
}

/// Test: Dirty bit after install follows the reference kind
#[test]
fn test_dirty_bit_after_install() {
    let (mut kernel, task, thread) = test_bootstrap(2);
    kernel.refer(0, ReferenceKind::Read, thread).unwrap();
    kernel
        .refer(page_address(&kernel, 1), ReferenceKind::Write, thread)
        .unwrap();

    let read_frame = kernel.page_entry(page(task, 0)).unwrap().frame().unwrap();
    let write_frame = kernel.page_entry(page(task, 1)).unwrap().frame().unwrap();
    assert!(!kernel.frame(read_frame).unwrap().is_dirty());
    assert!(kernel.frame(write_frame).unwrap().is_dirty());
}

/// Test: Only dirty victims are written back
#[test]
fn test_only_dirty_victims_written_back() {
    let (mut kernel, _, thread) = test_bootstrap(1);
    let swap_outs = |kernel: &sim_kernel::SimulatedKernel| {
        kernel.memory_audit().count_events(|e| matches!(
            e,
            MemoryEvent::TransferStarted {
                direction: TransferDirection::SwapOut,
                ..
            }
        ))
    };

    kernel.refer(0, ReferenceKind::Read, thread).unwrap();
    kernel
        .refer(page_address(&kernel, 1), ReferenceKind::Write, thread)
        .unwrap();
    assert_eq!(swap_outs(&kernel), 0);

    kernel
        .refer(page_address(&kernel, 2), ReferenceKind::Read, thread)
        .unwrap();
    assert_eq!(swap_outs(&kernel), 1);
}

/// Test: Unlock never drives the count below zero
#[test]
fn test_unlock_is_idempotent_at_zero() {
    let (mut kernel, task, thread) = test_bootstrap(1);
    kernel.refer(0, ReferenceKind::Read, thread).unwrap();
    let target = page(task, 0);
    let pin = io_request(thread, target, TransferDirection::SwapOut);

    kernel.lock_page(target, &pin).unwrap();
    kernel.unlock_page(target);
    kernel.unlock_page(target);
    let frame = kernel.page_entry(target).unwrap().frame().unwrap();
    assert_eq!(kernel.frame(frame).unwrap().lock_count(), 0);

    // A single lock still pins after the extra unlock
    kernel.lock_page(target, &pin).unwrap();
    assert_eq!(
        kernel.refer(page_address(&kernel, 1), ReferenceKind::Read, thread),
        Err(KernelError::NotEnoughMemory)
    );
    assert!(kernel.waiters_on(EventId::Page(target)).is_empty());
}
