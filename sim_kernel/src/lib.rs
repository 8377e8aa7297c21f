//! # Simulated Kernel
//!
//! This crate provides a simulated implementation of the kernel API: demand
//! paging over a fixed frame table with FIFO eviction, and a two-level
//! preemptive scheduler driven by a one-shot timer alarm.
//!
//! ## Purpose
//!
//! The simulated kernel allows testing paging and scheduling behavior
//! without hardware:
//! - Runs under `cargo test`
//! - Deterministic (controlled time, one processor, explicit interleaving)
//! - Inspectable (frames, page tables, queues and wait lists are all visible)
//!
//! ## Concurrency model
//!
//! Everything runs on the caller's stack. A swap transfer blocks its thread
//! by suspending it on the transfer's event; while the transfer is
//! outstanding the kernel runs the registered I/O interleaver, which is
//! where other threads get to fault, lock or die. Nothing is ever truly
//! concurrent, so no state is shared behind locks.

pub mod config;
pub mod devices;
pub mod fault_injection;
pub mod frame_table;
pub mod invariants;
pub mod memory_audit;
pub mod mmu;
mod page_fault;
mod page_lock;
pub mod page_table;
pub mod scheduler;
pub mod swap;
pub mod test_utils;
pub mod timer;
mod wait_queue;

use config::{ConfigError, KernelConfig};
use core_types::{FrameId, PageRef, ReferenceKind, TaskId, ThreadId};
use devices::{SimDeviceQueues, SimResourcePool};
use fault_injection::{FaultInjector, FaultPlan};
use frame_table::{Frame, FrameTable};
use hal::AlarmTimer;
use kernel_api::{
    Access, BackingStore, DeviceQueues, Duration, EventId, Instant, IoRequest, KernelApi,
    KernelError, ResourcePool,
};
use memory_audit::{MemoryAuditLog, MemoryEvent};
use mmu::Mmu;
use page_lock::PinLedger;
use page_table::{PageEntry, PageTable};
use scheduler::{Scheduler, ThreadStatus};
use std::collections::HashMap;
use swap::SimSwapDevice;
use timer::SimTimerDevice;
use wait_queue::{Continuation, WaitQueues};

/// Hook run while a swap transfer is outstanding
///
/// Receives the kernel and the request being serviced. Transfers started
/// from inside the hook run without it.
pub type IoInterleaver = Box<dyn FnMut(&mut SimulatedKernel, &IoRequest)>;

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Live,
    /// Last thread died; memory has been released
    Terminated,
}

#[derive(Debug)]
struct TaskInfo {
    priority: u32,
    status: TaskStatus,
    page_table: PageTable,
    /// Live threads
    threads: Vec<ThreadId>,
    current_thread: Option<ThreadId>,
}

/// Simulated kernel state
///
/// This maintains all the state needed to simulate the paging and
/// scheduling core. Unlike a real kernel, this state is directly accessible
/// for testing.
pub struct SimulatedKernel {
    config: KernelConfig,
    timer: SimTimerDevice,
    frames: FrameTable,
    mmu: Mmu,
    scheduler: Scheduler,
    tasks: HashMap<TaskId, TaskInfo>,
    waits: WaitQueues,
    pins: PinLedger,
    backing_store: Box<dyn BackingStore>,
    devices: Box<dyn DeviceQueues>,
    resources: Box<dyn ResourcePool>,
    /// Fault injector (optional, for testing)
    fault_injector: Option<FaultInjector>,
    io_interleaver: Option<IoInterleaver>,
    next_fault: u64,
    next_request: u64,
    /// Audit log for paging operations (test-only)
    memory_audit: MemoryAuditLog,
}

impl SimulatedKernel {
    /// Creates a kernel with the default configuration
    pub fn new() -> Self {
        Self::build(KernelConfig::default())
    }

    /// Creates a kernel with a custom configuration
    pub fn with_config(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: KernelConfig) -> Self {
        let frame_count = config.memory.frame_count;
        Self {
            timer: SimTimerDevice::new(),
            frames: FrameTable::new(frame_count, config.memory.page_size()),
            mmu: Mmu::new(frame_count),
            scheduler: Scheduler::with_config(config.scheduler.clone()),
            tasks: HashMap::new(),
            waits: WaitQueues::new(),
            pins: PinLedger::new(),
            backing_store: Box::new(SimSwapDevice::new()),
            devices: Box::new(SimDeviceQueues::new()),
            resources: Box::new(SimResourcePool::default()),
            fault_injector: None,
            io_interleaver: None,
            next_fault: 0,
            next_request: 0,
            memory_audit: MemoryAuditLog::new(),
            config,
        }
    }

    /// Replaces the swap device
    pub fn with_backing_store(mut self, store: Box<dyn BackingStore>) -> Self {
        self.backing_store = store;
        self
    }

    /// Replaces the device queues
    pub fn with_device_queues(mut self, devices: Box<dyn DeviceQueues>) -> Self {
        self.devices = devices;
        self
    }

    /// Replaces the resource pool
    pub fn with_resource_pool(mut self, resources: Box<dyn ResourcePool>) -> Self {
        self.resources = resources;
        self
    }

    /// Sets a fault plan for this kernel
    ///
    /// This enables deterministic fault injection into swap transfers.
    pub fn with_fault_plan(mut self, plan: FaultPlan) -> Self {
        self.fault_injector = Some(FaultInjector::new(plan));
        self
    }

    /// Installs the hook run while each transfer is outstanding
    pub fn set_io_interleaver<F>(&mut self, hook: F)
    where
        F: FnMut(&mut SimulatedKernel, &IoRequest) + 'static,
    {
        self.io_interleaver = Some(Box::new(hook));
    }

    pub fn clear_io_interleaver(&mut self) {
        self.io_interleaver = None;
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn memory_audit(&self) -> &MemoryAuditLog {
        &self.memory_audit
    }

    pub fn clear_memory_audit(&mut self) {
        self.memory_audit.clear();
    }

    pub fn fault_injector(&self) -> Option<&FaultInjector> {
        self.fault_injector.as_ref()
    }

    pub fn page_table(&self, task: TaskId) -> Option<&PageTable> {
        self.tasks.get(&task).map(|info| &info.page_table)
    }

    pub fn page_entry(&self, page: PageRef) -> Option<&PageEntry> {
        self.page_table(page.task)?.entry(page.page)
    }

    pub(crate) fn page_entry_mut(&mut self, page: PageRef) -> Option<&mut PageEntry> {
        self.tasks
            .get_mut(&page.task)?
            .page_table
            .entry_mut(page.page)
    }

    pub fn task_status(&self, task: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&task).map(|info| info.status)
    }

    pub fn task_priority(&self, task: TaskId) -> Option<u32> {
        self.tasks.get(&task).map(|info| info.priority)
    }

    /// Live threads of `task`
    pub fn task_threads(&self, task: TaskId) -> Vec<ThreadId> {
        self.tasks
            .get(&task)
            .map(|info| info.threads.clone())
            .unwrap_or_default()
    }

    /// Thread of `task` currently holding the processor
    pub fn task_current_thread(&self, task: TaskId) -> Option<ThreadId> {
        self.tasks.get(&task).and_then(|info| info.current_thread)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn thread_status(&self, thread: ThreadId) -> Option<ThreadStatus> {
        self.scheduler.status(thread)
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.scheduler.current()
    }

    /// Frames pinned by `thread`, one entry per pin
    pub fn pins_held_by(&self, thread: ThreadId) -> Vec<FrameId> {
        self.pins.held_by(thread)
    }

    /// Threads waiting on `event`, in arrival order
    pub fn waiters_on(&self, event: EventId) -> Vec<ThreadId> {
        self.waits.waiters(event)
    }

    /// True when no thread is running or ready
    pub fn is_idle(&self) -> bool {
        self.scheduler.current().is_none() && !self.scheduler.has_runnable_threads()
    }

    pub(crate) fn now_ticks(&self) -> u64 {
        self.timer.current_ticks()
    }

    /// Releases every waiter on `event`
    ///
    /// Each live waiter is resumed one level, then finishes whatever access
    /// or lock it was waiting to perform.
    pub fn notify(&mut self, event: EventId) {
        for waiter in self.waits.take_all(event) {
            if self.scheduler.is_killed(waiter.thread) {
                continue;
            }
            if let Err(err) = self.resume_one(waiter.thread) {
                log::warn!("waiter on {} could not be resumed: {}", event, err);
                continue;
            }
            match waiter.continuation {
                Continuation::None => {}
                Continuation::Access { page, kind, store } => {
                    self.complete_access(waiter.thread, page, kind, store)
                }
                Continuation::Lock { page, request } => {
                    self.complete_lock(waiter.thread, page, request)
                }
            }
        }
    }

    fn register_thread(&mut self, task: TaskId) -> Result<ThreadId, KernelError> {
        let now = self.now_ticks();
        let max_threads = self.config.scheduler.max_threads_per_task;
        let info = self
            .tasks
            .get_mut(&task)
            .filter(|info| info.status == TaskStatus::Live)
            .ok_or(KernelError::UnknownTask(task))?;

        if info.threads.len() >= max_threads {
            log::warn!("{} already holds {} threads", task, max_threads);
            return Err(KernelError::ThreadLimitReached(task));
        }

        let thread = ThreadId::new();
        info.threads.push(thread);
        self.scheduler.add_thread(thread, task, now);
        log::debug!("created {} in {}", thread, task);
        Ok(thread)
    }

    pub(crate) fn terminate_thread(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        let now = self.now_ticks();
        let task = self
            .scheduler
            .task_of(thread)
            .ok_or(KernelError::UnknownThread(thread))?;
        let was_running = self.scheduler.kill(thread, now)?;
        if was_running {
            self.release_processor(thread);
        }

        self.waits.remove_thread(thread);
        let cancelled = self.devices.cancel_pending_io(thread);
        let unpinned = self.release_pins_of(thread);
        let released = self.resources.give_up_resources(thread);
        log::debug!(
            "killed {}: {} transfers cancelled, {} pins dropped, {} resource units released",
            thread,
            cancelled.len(),
            unpinned,
            released
        );

        let task_emptied = match self.tasks.get_mut(&task) {
            Some(info) => {
                info.threads.retain(|t| *t != thread);
                if info.current_thread == Some(thread) {
                    info.current_thread = None;
                }
                info.threads.is_empty() && info.status == TaskStatus::Live
            }
            None => false,
        };

        self.dispatch_next();

        if task_emptied {
            self.destroy_task(task);
        }
        Ok(())
    }

    fn destroy_task(&mut self, task: TaskId) {
        if let Some(info) = self.tasks.get_mut(&task) {
            info.status = TaskStatus::Terminated;
        }
        let frames = self.release_task_memory(task);
        log::info!("{} terminated, {} frames released", task, frames);
    }

    /// Returns a dead task's frames to the free pool
    ///
    /// Every frame holding one of the task's pages is emptied and the page
    /// entry unbound, and any pin still left on it is dropped; every
    /// reservation the task holds is dropped too.
    pub(crate) fn release_task_memory(&mut self, task: TaskId) -> usize {
        let owned: Vec<_> = self
            .frames
            .iter()
            .filter(|f| f.page().map(|p| p.task) == Some(task) || f.reserved_by() == Some(task))
            .map(Frame::id)
            .collect();

        let mut released = 0;
        for id in owned {
            let resident_here = self
                .frames
                .get(id)
                .and_then(Frame::page)
                .filter(|page| page.task == task);
            if let Some(page) = resident_here {
                self.frames.clear(id);
                self.release_pins_on(id);
                if let Some(entry) = self.page_entry_mut(page) {
                    entry.unbind();
                }
                released += 1;
            }
            self.frames.release_reservation(id, task);
        }

        self.memory_audit.record(MemoryEvent::TaskMemoryReleased {
            task,
            frames: released,
            timestamp_ticks: self.now_ticks(),
        });
        released
    }

    /// Suspends `thread` on `event`, remembering what it still has to do
    pub(crate) fn suspend_on(
        &mut self,
        thread: ThreadId,
        event: EventId,
        continuation: Continuation,
    ) -> Result<(), KernelError> {
        let now = self.now_ticks();
        let (depth, was_running) = self.scheduler.suspend(thread, now)?;
        if was_running {
            self.release_processor(thread);
        }
        self.waits.add(event, thread, continuation);
        log::trace!("{} waits on {} at depth {}", thread, event, depth);
        self.dispatch_next();
        Ok(())
    }

    /// Undoes one wait level and dispatches; rejected resumes change nothing
    pub(crate) fn resume_one(&mut self, thread: ThreadId) -> Result<ThreadStatus, KernelError> {
        let now = self.now_ticks();
        let status = self.scheduler.resume(thread, now)?;
        self.dispatch_next();
        Ok(status)
    }

    fn release_processor(&mut self, thread: ThreadId) {
        self.mmu.unbind();
        let task = self.scheduler.task_of(thread);
        if let Some(info) = task.and_then(|task| self.tasks.get_mut(&task)) {
            if info.current_thread == Some(thread) {
                info.current_thread = None;
            }
        }
    }

    /// Takes the processor from the running thread and hands it to the next
    ///
    /// The new thread's task page table becomes active and the alarm is
    /// armed with the quantum of the queue it came from. With nothing to run
    /// the processor is left without a page table.
    pub(crate) fn dispatch_next(&mut self) -> Option<ThreadId> {
        let now = self.now_ticks();
        if let Some(previous) = self.scheduler.preempt_current(now) {
            self.release_processor(previous);
        }

        match self.scheduler.select_next(now) {
            Some(selection) => {
                self.mmu.bind(selection.task);
                if let Some(info) = self.tasks.get_mut(&selection.task) {
                    info.current_thread = Some(selection.thread);
                }
                self.timer.arm(selection.quantum_ticks);
                log::trace!(
                    "dispatched {} from {:?} queue for {} ticks",
                    selection.thread,
                    selection.level,
                    selection.quantum_ticks
                );
                Some(selection.thread)
            }
            None => {
                self.mmu.unbind();
                None
            }
        }
    }

    /// Moves the clock forward, delivering every alarm that falls due
    pub(crate) fn run_clock(&mut self, ticks: u64) {
        let mut remaining = ticks;
        loop {
            match self.timer.ticks_until_alarm() {
                Some(until) if until <= remaining => {
                    self.timer.advance_ticks(until);
                    remaining -= until;
                    if self.timer.take_expired() {
                        self.timer_interrupt();
                    }
                }
                _ => {
                    self.timer.advance_ticks(remaining);
                    return;
                }
            }
        }
    }

    fn timer_interrupt(&mut self) {
        log::trace!("timer interrupt at tick {}", self.now_ticks());
        self.dispatch_next();
    }
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelApi for SimulatedKernel {
    fn create_task(&mut self, priority: u32) -> TaskId {
        let task = TaskId::new();
        let page_count = self.config.memory.page_count();
        self.tasks.insert(
            task,
            TaskInfo {
                priority,
                status: TaskStatus::Live,
                page_table: PageTable::new(task, page_count),
                threads: Vec::new(),
                current_thread: None,
            },
        );
        log::debug!("created {} with {} pages", task, page_count);
        task
    }

    fn create_thread(&mut self, task: TaskId) -> Result<ThreadId, KernelError> {
        let result = self.register_thread(task);
        self.dispatch_next();
        result
    }

    fn kill_thread(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        self.terminate_thread(thread)
    }

    fn kill_task(&mut self, task: TaskId) -> Result<(), KernelError> {
        let info = self.tasks.get(&task).ok_or(KernelError::UnknownTask(task))?;
        if info.status == TaskStatus::Terminated {
            return Ok(());
        }
        let threads = info.threads.clone();
        if threads.is_empty() {
            self.destroy_task(task);
            return Ok(());
        }
        for thread in threads {
            self.terminate_thread(thread)?;
        }
        Ok(())
    }

    fn suspend(&mut self, thread: ThreadId, event: EventId) -> Result<(), KernelError> {
        self.suspend_on(thread, event, Continuation::None)
    }

    fn resume(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        let waiting = self
            .scheduler
            .status(thread)
            .is_some_and(|status| status.wait_depth() > 0);
        if waiting {
            self.waits.remove_latest(thread);
        }
        self.resume_one(thread)?;
        Ok(())
    }

    fn dispatch(&mut self) -> Result<ThreadId, KernelError> {
        self.dispatch_next().ok_or(KernelError::NoRunnableThread)
    }

    fn refer(
        &mut self,
        address: u64,
        kind: ReferenceKind,
        thread: ThreadId,
    ) -> Result<Access<PageRef>, KernelError> {
        self.translate(address, kind, thread, None)
    }

    fn lock_page(
        &mut self,
        page: PageRef,
        request: &IoRequest,
    ) -> Result<Access<()>, KernelError> {
        self.pin_page(page, request)
    }

    fn unlock_page(&mut self, page: PageRef) {
        self.unpin_page(page)
    }

    fn now(&self) -> Instant {
        Instant::from_ticks(self.timer.current_ticks())
    }

    fn advance_time(&mut self, duration: Duration) {
        self.run_clock(duration.as_ticks())
    }
}
