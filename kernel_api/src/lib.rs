//! # Kernel API
//!
//! This crate defines the boundary of the paging and scheduling core.
//!
//! ## Philosophy
//!
//! The core provides **mechanisms** and consumes its collaborators through
//! narrow contracts:
//! - Swap transfers go through [`BackingStore`]
//! - Pending device requests are purged through [`DeviceQueues`]
//! - Held resources are returned through [`ResourcePool`]
//! - Time is explicit ([`Instant`], [`Duration`]), never ambient
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A device driver interface (transfers are whole pages, no layout)
//! - A multi-core interface (one processor, cooperative interleaving)

pub mod error;
pub mod io;
pub mod kernel;
pub mod time;

pub use error::{ErrorKind, KernelError};
pub use io::{BackingStore, DeviceQueues, IoRequest, IoRequestId, ResourcePool, TransferDirection};
pub use kernel::{Access, EventId, FaultId, KernelApi};
pub use time::{Duration, Instant};
