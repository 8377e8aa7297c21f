//! Kernel configuration
//!
//! All sizes and time constants of the simulation live here. Defaults give a
//! 64-page address space with 1 KiB pages over 16 frames, a 30-tick burst
//! threshold and 30/100-tick quanta.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page index bits ({page}) exceed virtual address bits ({virt})")]
    PageBitsExceedAddressBits { page: u32, virt: u32 },

    #[error("virtual address bits ({0}) too large")]
    AddressBitsTooLarge(u32),

    #[error("frame table must hold at least one frame")]
    NoFrames,

    #[error("quantum must be non-zero")]
    ZeroQuantum,

    #[error("a task must be allowed at least one thread")]
    NoThreadsAllowed,

    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Memory geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Width of a virtual address
    pub virtual_address_bits: u32,
    /// Bits of the address that select the page
    pub page_address_bits: u32,
    /// Number of physical frames
    pub frame_count: usize,
    /// Simulated duration of one swap transfer
    pub swap_latency_ticks: u64,
}

impl MemoryConfig {
    /// Bytes per page: `2^(virtual_address_bits - page_address_bits)`
    pub fn page_size(&self) -> usize {
        1usize << (self.virtual_address_bits - self.page_address_bits)
    }

    /// Entries per page table: `2^page_address_bits`
    pub fn page_count(&self) -> usize {
        1usize << self.page_address_bits
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            virtual_address_bits: 16,
            page_address_bits: 6,
            frame_count: 16,
            swap_latency_ticks: 10,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Bursts at or under this length keep a thread in the high queue
    pub burst_threshold_ticks: u64,
    /// Quantum for threads dispatched from the high queue
    pub high_quantum_ticks: u64,
    /// Quantum for threads dispatched from the low queue
    pub low_quantum_ticks: u64,
    /// Live threads a single task may hold
    pub max_threads_per_task: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            burst_threshold_ticks: 30,
            high_quantum_ticks: 30,
            low_quantum_ticks: 100,
            max_threads_per_task: 10,
        }
    }
}

/// Complete kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub memory: MemoryConfig,
    pub scheduler: SchedulerConfig,
}

impl KernelConfig {
    /// Parses a JSON configuration; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the kernel cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;
        if memory.page_address_bits > memory.virtual_address_bits {
            return Err(ConfigError::PageBitsExceedAddressBits {
                page: memory.page_address_bits,
                virt: memory.virtual_address_bits,
            });
        }
        if memory.virtual_address_bits >= usize::BITS {
            return Err(ConfigError::AddressBitsTooLarge(memory.virtual_address_bits));
        }
        if memory.frame_count == 0 {
            return Err(ConfigError::NoFrames);
        }

        let scheduler = &self.scheduler;
        if scheduler.high_quantum_ticks == 0 || scheduler.low_quantum_ticks == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if scheduler.max_threads_per_task == 0 {
            return Err(ConfigError::NoThreadsAllowed);
        }
        Ok(())
    }
}
