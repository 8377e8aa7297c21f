//! Test utilities for paging and scheduling tests
//!
//! This module provides helper functions for building small, predictable
//! kernels and driving them through interleavings.

use crate::config::KernelConfig;
use crate::fault_injection::FaultPlan;
use crate::SimulatedKernel;
use core_types::{PageRef, TaskId, ThreadId};
use kernel_api::{Duration, IoRequest, IoRequestId, KernelApi, TransferDirection};

/// Configuration for a 16-page address space of 256-byte pages
///
/// Quanta are long enough that no timer interrupt lands inside a handful
/// of faults, so the running thread only changes when a test says so.
pub fn small_config(frame_count: usize) -> KernelConfig {
    let mut config = KernelConfig::default();
    config.memory.virtual_address_bits = 12;
    config.memory.page_address_bits = 4;
    config.memory.frame_count = frame_count;
    config.scheduler.high_quantum_ticks = 1_000;
    config.scheduler.low_quantum_ticks = 1_000;
    config
}

/// Builds a kernel from [`small_config`] with one task and one running thread
///
/// # Panics
///
/// Panics if `frame_count` is zero.
pub fn small_kernel(frame_count: usize) -> (SimulatedKernel, TaskId, ThreadId) {
    let kernel = SimulatedKernel::with_config(small_config(frame_count))
        .expect("small_config is valid for non-zero frame counts");
    spawn(kernel)
}

/// Like [`small_kernel`], with a fault plan applied
///
/// # Panics
///
/// Panics if `frame_count` is zero.
pub fn small_kernel_with_plan(
    frame_count: usize,
    plan: FaultPlan,
) -> (SimulatedKernel, TaskId, ThreadId) {
    let kernel = SimulatedKernel::with_config(small_config(frame_count))
        .expect("small_config is valid for non-zero frame counts")
        .with_fault_plan(plan);
    spawn(kernel)
}

fn spawn(mut kernel: SimulatedKernel) -> (SimulatedKernel, TaskId, ThreadId) {
    let task = kernel.create_task(1);
    let thread = kernel
        .create_thread(task)
        .expect("a fresh task accepts a thread");
    (kernel, task, thread)
}

/// First virtual address of page `page`
pub fn page_address(kernel: &SimulatedKernel, page: usize) -> u64 {
    (page * kernel.config().memory.page_size()) as u64
}

/// A transfer request to hand to `lock_page`
pub fn io_request(thread: ThreadId, page: PageRef, direction: TransferDirection) -> IoRequest {
    IoRequest {
        id: IoRequestId(u64::MAX),
        thread,
        page,
        slot: page.swap_slot(),
        direction,
    }
}

/// Dispatches until `thread` holds the processor
///
/// Returns false if it never comes up, e.g. because it is waiting.
pub fn switch_to(kernel: &mut SimulatedKernel, thread: ThreadId) -> bool {
    let attempts = kernel.scheduler().runnable_count() + 1;
    for _ in 0..attempts {
        if kernel.current_thread() == Some(thread) {
            return true;
        }
        if kernel.dispatch().is_err() {
            return false;
        }
    }
    kernel.current_thread() == Some(thread)
}

/// Runs a test with a fault plan applied
///
/// This is a convenience helper that creates a kernel with the given
/// fault plan and passes it to the test closure.
///
/// # Example
///
/// ```
/// use sim_kernel::test_utils::with_fault_plan;
/// use sim_kernel::fault_injection::{FaultPlan, IoFault};
/// use kernel_api::TransferDirection;
///
/// with_fault_plan(
///     FaultPlan::new().with_io_fault(IoFault::KillRequester {
///         direction: TransferDirection::SwapIn,
///         nth: 1,
///     }),
///     |kernel| {
///         assert_eq!(kernel.task_count(), 0);
///     },
/// );
/// ```
pub fn with_fault_plan<F>(plan: FaultPlan, f: F)
where
    F: FnOnce(&mut SimulatedKernel),
{
    let mut kernel = SimulatedKernel::new().with_fault_plan(plan);
    f(&mut kernel);
}

/// Runs a kernel for a specific duration in fixed steps
pub fn run_for_duration(kernel: &mut SimulatedKernel, duration: Duration) {
    let target_time = kernel.now() + duration;
    const TIME_STEP: Duration = Duration::from_ticks(1);

    while kernel.now() < target_time {
        kernel.advance_time(TIME_STEP);
    }
}
