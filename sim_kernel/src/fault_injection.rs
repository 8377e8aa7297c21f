//! Deterministic fault injection for testing
//!
//! This module lets tests kill a thread at a precise point inside a swap
//! transfer, which is where the paging core's failure paths live.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: Faults fire on the n-th transfer of a direction
//! - **Composable**: Several faults can be combined in one plan
//! - **Test-focused**: Not intended for production use
//!
//! ## Example
//!
//! ```
//! use sim_kernel::fault_injection::{FaultPlan, IoFault};
//! use kernel_api::TransferDirection;
//!
//! let plan = FaultPlan::new()
//!     .with_io_fault(IoFault::KillRequester { direction: TransferDirection::SwapOut, nth: 1 });
//! assert_eq!(plan.io_faults().len(), 1);
//! ```

use core_types::ThreadId;
use kernel_api::{IoRequest, TransferDirection};

/// A fault to inject into swap transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoFault {
    /// Kill the requesting thread while its `nth` transfer in `direction`
    /// is outstanding (1-based, counted kernel-wide)
    KillRequester {
        direction: TransferDirection,
        nth: usize,
    },

    /// Kill a specific thread while the `nth` transfer in `direction` is
    /// outstanding
    KillThread {
        thread: ThreadId,
        direction: TransferDirection,
        nth: usize,
    },
}

/// A plan describing all faults to inject
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    io_faults: Vec<IoFault>,
}

impl FaultPlan {
    /// Creates a new empty fault plan
    pub fn new() -> Self {
        Self {
            io_faults: Vec::new(),
        }
    }

    /// Adds a transfer fault to the plan
    pub fn with_io_fault(mut self, fault: IoFault) -> Self {
        self.io_faults.push(fault);
        self
    }

    pub fn io_faults(&self) -> &[IoFault] {
        &self.io_faults
    }
}

/// Applies a [`FaultPlan`] to the transfers the kernel issues
#[derive(Debug)]
pub struct FaultInjector {
    plan: FaultPlan,
    swap_ins_seen: usize,
    swap_outs_seen: usize,
    kills: Vec<ThreadId>,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            swap_ins_seen: 0,
            swap_outs_seen: 0,
            kills: Vec::new(),
        }
    }

    /// Counts `request` and returns the threads to kill while it is
    /// outstanding
    pub fn on_transfer(&mut self, request: &IoRequest) -> Vec<ThreadId> {
        let seen = match request.direction {
            TransferDirection::SwapIn => {
                self.swap_ins_seen += 1;
                self.swap_ins_seen
            }
            TransferDirection::SwapOut => {
                self.swap_outs_seen += 1;
                self.swap_outs_seen
            }
        };

        let victims: Vec<ThreadId> = self
            .plan
            .io_faults()
            .iter()
            .filter_map(|fault| match fault {
                IoFault::KillRequester { direction, nth }
                    if *direction == request.direction && *nth == seen =>
                {
                    Some(request.thread)
                }
                IoFault::KillThread {
                    thread,
                    direction,
                    nth,
                } if *direction == request.direction && *nth == seen => Some(*thread),
                _ => None,
            })
            .collect();

        self.kills.extend(victims.iter().copied());
        victims
    }

    /// Threads killed so far, in order
    pub fn kills(&self) -> &[ThreadId] {
        &self.kills
    }

    pub fn transfers_seen(&self, direction: TransferDirection) -> usize {
        match direction {
            TransferDirection::SwapIn => self.swap_ins_seen,
            TransferDirection::SwapOut => self.swap_outs_seen,
        }
    }
}
