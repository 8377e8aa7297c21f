//! Resilience Test Utilities
//!
//! This crate provides shared utilities for paging and scheduling
//! integration tests.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: Frame and page tables stay consistent when a
//!   thread dies in the middle of a swap transfer
//! - **Deterministic failures**: All kills are reproducible via FaultPlan
//!   or an explicit I/O interleaver
//! - **Nothing leaks**: Reservations, pins and wait registrations are
//!   released on every path

use core_types::{PageNumber, PageRef, ReferenceKind, TaskId, ThreadId};
use kernel_api::KernelApi;
use sim_kernel::frame_table::FrameSnapshot;
use sim_kernel::test_utils::{page_address, small_kernel};
use sim_kernel::SimulatedKernel;

/// Bootstrap helper for tests
///
/// Creates a kernel with `frame_count` frames and one task running one
/// thread. See [`sim_kernel::test_utils::small_config`] for the geometry.
pub fn test_bootstrap(frame_count: usize) -> (SimulatedKernel, TaskId, ThreadId) {
    small_kernel(frame_count)
}

/// Makes pages `0..count` of the active task resident, in order
pub fn touch_pages(
    kernel: &mut SimulatedKernel,
    thread: ThreadId,
    count: usize,
    kind: ReferenceKind,
) -> Result<(), kernel_api::KernelError> {
    for page in 0..count {
        let address = page_address(kernel, page);
        kernel.refer(address, kind, thread)?;
    }
    Ok(())
}

/// Handle to page `n` of `task`
pub fn page(task: TaskId, n: usize) -> PageRef {
    PageRef::new(task, PageNumber(n))
}

/// Frame table state as JSON, for exact before/after comparisons
pub fn frame_state(kernel: &SimulatedKernel) -> String {
    let snapshot: Vec<FrameSnapshot> = kernel.frames().snapshot();
    serde_json::to_string(&snapshot).unwrap_or_default()
}

/// Panics with the violation if the kernel state is inconsistent
pub fn assert_consistent(kernel: &SimulatedKernel) {
    if let Err(violation) = kernel.check_invariants() {
        panic!("kernel state inconsistent: {}", violation);
    }
}
