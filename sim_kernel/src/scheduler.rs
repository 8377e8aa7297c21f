//! Multilevel round-robin scheduler
//!
//! ## Design
//!
//! - **Two ready queues**: high and low priority, both FIFO.
//! - **Burst-based placement**: a thread becoming Ready joins the high queue
//!   if its last CPU burst was at or under the threshold, or if it has never
//!   run; otherwise it joins the low queue.
//! - **Quantum by level**: threads taken from the high queue get the short
//!   quantum, threads from the low queue get the long one.
//! - **Nested waits**: a waiting thread that suspends again waits one level
//!   deeper and must be resumed once per level.
//! - **Determinism first**: time is passed in; same inputs give the same
//!   schedule.
//!
//! The scheduler only tracks thread states and queues. Binding the
//! processor's page table and arming the alarm is the kernel's job.

use crate::config::SchedulerConfig;
use core_types::{TaskId, ThreadId};
use kernel_api::KernelError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;

/// Thread lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    /// In one of the ready queues
    Ready,
    /// Holds the processor
    Running,
    /// Suspended on `depth` nested events
    Waiting(NonZeroU32),
    /// Terminal
    Killed,
}

impl ThreadStatus {
    pub fn is_killed(&self) -> bool {
        matches!(self, ThreadStatus::Killed)
    }

    pub fn wait_depth(&self) -> u32 {
        match self {
            ThreadStatus::Waiting(depth) => depth.get(),
            _ => 0,
        }
    }
}

/// Ready queue level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueLevel {
    High,
    Low,
}

/// Scheduling event for audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    ThreadCreated {
        thread: ThreadId,
        task: TaskId,
        timestamp_ticks: u64,
    },
    /// Thread was given the processor
    Dispatched {
        thread: ThreadId,
        level: QueueLevel,
        quantum_ticks: u64,
        timestamp_ticks: u64,
    },
    /// Running thread was taken off the processor and requeued
    Preempted {
        thread: ThreadId,
        burst_ticks: u64,
        requeued_to: QueueLevel,
        timestamp_ticks: u64,
    },
    Suspended {
        thread: ThreadId,
        depth: u32,
        timestamp_ticks: u64,
    },
    Resumed {
        thread: ThreadId,
        status: ThreadStatus,
        timestamp_ticks: u64,
    },
    /// Resume on a thread that was not waiting
    ResumeRejected {
        thread: ThreadId,
        status: ThreadStatus,
        timestamp_ticks: u64,
    },
    Killed {
        thread: ThreadId,
        timestamp_ticks: u64,
    },
    /// Both queues empty
    Idle { timestamp_ticks: u64 },
}

fn placement(threshold: u64, last_cpu_burst: Option<u64>) -> QueueLevel {
    match last_cpu_burst {
        Some(burst) if burst > threshold => QueueLevel::Low,
        _ => QueueLevel::High,
    }
}

/// Result of a successful dispatch selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub thread: ThreadId,
    pub task: TaskId,
    pub level: QueueLevel,
    pub quantum_ticks: u64,
}

/// Thread metadata tracked by scheduler
#[derive(Debug)]
struct ThreadInfo {
    task: TaskId,
    status: ThreadStatus,
    /// Length of the most recent run; `None` until the thread is first preempted
    last_cpu_burst: Option<u64>,
    last_dispatch: Option<u64>,
}

/// FIFO ready queue
#[derive(Debug)]
struct RunQueue {
    queue: VecDeque<ThreadId>,
}

impl RunQueue {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    fn enqueue(&mut self, thread: ThreadId) {
        self.queue.push_back(thread);
    }

    fn dequeue(&mut self) -> Option<ThreadId> {
        self.queue.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn remove(&mut self, thread: ThreadId) {
        self.queue.retain(|&id| id != thread);
    }

    fn snapshot(&self) -> Vec<ThreadId> {
        self.queue.iter().copied().collect()
    }
}

/// Preemptive two-level scheduler
pub struct Scheduler {
    pub(crate) config: SchedulerConfig,
    high: RunQueue,
    low: RunQueue,
    threads: HashMap<ThreadId, ThreadInfo>,
    current: Option<ThreadId>,
    /// Audit log for scheduling events (test-only)
    audit_log: Vec<ScheduleEvent>,
}

impl Scheduler {
    /// Creates a new scheduler with default configuration
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a new scheduler with custom configuration
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            high: RunQueue::new(),
            low: RunQueue::new(),
            threads: HashMap::new(),
            current: None,
            audit_log: Vec::new(),
        }
    }

    /// Registers a new thread as Ready
    ///
    /// With no burst history it always starts in the high queue.
    pub fn add_thread(&mut self, thread: ThreadId, task: TaskId, now: u64) {
        self.threads.insert(
            thread,
            ThreadInfo {
                task,
                status: ThreadStatus::Ready,
                last_cpu_burst: None,
                last_dispatch: None,
            },
        );
        self.high.enqueue(thread);
        self.audit_log.push(ScheduleEvent::ThreadCreated {
            thread,
            task,
            timestamp_ticks: now,
        });
    }

    /// Queue a Ready thread belongs in, given its burst history
    pub fn placement(&self, last_cpu_burst: Option<u64>) -> QueueLevel {
        placement(self.config.burst_threshold_ticks, last_cpu_burst)
    }

    /// Takes the running thread off the processor
    ///
    /// The thread becomes Ready, its burst is recorded as the time since its
    /// dispatch, and it is requeued by the placement rule.
    pub fn preempt_current(&mut self, now: u64) -> Option<ThreadId> {
        let thread = self.current.take()?;
        let threshold = self.config.burst_threshold_ticks;
        let info = self.threads.get_mut(&thread)?;

        let burst = now.saturating_sub(info.last_dispatch.unwrap_or(now));
        info.last_cpu_burst = Some(burst);
        info.status = ThreadStatus::Ready;

        let level = placement(threshold, Some(burst));
        self.queue_mut(level).enqueue(thread);

        self.audit_log.push(ScheduleEvent::Preempted {
            thread,
            burst_ticks: burst,
            requeued_to: level,
            timestamp_ticks: now,
        });
        Some(thread)
    }

    /// Picks the next thread to run
    ///
    /// Prefers the high queue. Returns `None` when both queues are empty.
    pub fn select_next(&mut self, now: u64) -> Option<Selection> {
        let (thread, level, quantum_ticks) = if let Some(thread) = self.high.dequeue() {
            (thread, QueueLevel::High, self.config.high_quantum_ticks)
        } else if let Some(thread) = self.low.dequeue() {
            (thread, QueueLevel::Low, self.config.low_quantum_ticks)
        } else {
            self.current = None;
            self.audit_log.push(ScheduleEvent::Idle {
                timestamp_ticks: now,
            });
            return None;
        };

        let info = self.threads.get_mut(&thread)?;
        info.status = ThreadStatus::Running;
        info.last_dispatch = Some(now);
        let task = info.task;
        self.current = Some(thread);

        self.audit_log.push(ScheduleEvent::Dispatched {
            thread,
            level,
            quantum_ticks,
            timestamp_ticks: now,
        });

        Some(Selection {
            thread,
            task,
            level,
            quantum_ticks,
        })
    }

    /// Moves a thread one wait level deeper
    ///
    /// Running and Ready threads go to `Waiting(1)`; a Ready thread is taken
    /// out of its queue. Returns the new depth and whether the thread was
    /// holding the processor.
    pub fn suspend(&mut self, thread: ThreadId, now: u64) -> Result<(u32, bool), KernelError> {
        let info = self
            .threads
            .get_mut(&thread)
            .ok_or(KernelError::UnknownThread(thread))?;

        let mut was_running = false;
        let depth = match info.status {
            ThreadStatus::Killed => return Err(KernelError::ThreadKilled(thread)),
            ThreadStatus::Running => {
                was_running = true;
                NonZeroU32::MIN
            }
            ThreadStatus::Ready => NonZeroU32::MIN,
            ThreadStatus::Waiting(depth) => depth.saturating_add(1),
        };
        info.status = ThreadStatus::Waiting(depth);

        self.high.remove(thread);
        self.low.remove(thread);
        if self.current == Some(thread) {
            self.current = None;
        }

        self.audit_log.push(ScheduleEvent::Suspended {
            thread,
            depth: depth.get(),
            timestamp_ticks: now,
        });
        Ok((depth.get(), was_running))
    }

    /// Moves a thread one wait level up
    ///
    /// From `Waiting(1)` the thread becomes Ready and is queued by the
    /// placement rule. A thread that is not waiting is rejected with
    /// `NotWaiting` and nothing changes.
    pub fn resume(&mut self, thread: ThreadId, now: u64) -> Result<ThreadStatus, KernelError> {
        let threshold = self.config.burst_threshold_ticks;
        let info = self
            .threads
            .get_mut(&thread)
            .ok_or(KernelError::UnknownThread(thread))?;

        let depth = match info.status {
            ThreadStatus::Waiting(depth) => depth,
            status => {
                log::warn!("attempt to resume {}, which wasn't waiting ({:?})", thread, status);
                self.audit_log.push(ScheduleEvent::ResumeRejected {
                    thread,
                    status,
                    timestamp_ticks: now,
                });
                return Err(KernelError::NotWaiting(thread));
            }
        };

        let status = match NonZeroU32::new(depth.get() - 1) {
            Some(shallower) => ThreadStatus::Waiting(shallower),
            None => ThreadStatus::Ready,
        };
        info.status = status;

        if status == ThreadStatus::Ready {
            let level = placement(threshold, info.last_cpu_burst);
            self.queue_mut(level).enqueue(thread);
        }

        self.audit_log.push(ScheduleEvent::Resumed {
            thread,
            status,
            timestamp_ticks: now,
        });
        Ok(status)
    }

    /// Marks a thread Killed and drops it from every queue
    ///
    /// Returns whether the thread was holding the processor.
    pub fn kill(&mut self, thread: ThreadId, now: u64) -> Result<bool, KernelError> {
        let info = self
            .threads
            .get_mut(&thread)
            .ok_or(KernelError::UnknownThread(thread))?;
        if info.status.is_killed() {
            return Err(KernelError::ThreadKilled(thread));
        }
        info.status = ThreadStatus::Killed;

        self.high.remove(thread);
        self.low.remove(thread);
        let was_running = self.current == Some(thread);
        if was_running {
            self.current = None;
        }

        self.audit_log.push(ScheduleEvent::Killed {
            thread,
            timestamp_ticks: now,
        });
        Ok(was_running)
    }

    /// Returns the running thread
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Every known thread with its status, including killed ones
    pub fn threads(&self) -> impl Iterator<Item = (ThreadId, ThreadStatus)> + '_ {
        self.threads.iter().map(|(id, info)| (*id, info.status))
    }

    pub fn status(&self, thread: ThreadId) -> Option<ThreadStatus> {
        self.threads.get(&thread).map(|info| info.status)
    }

    pub fn task_of(&self, thread: ThreadId) -> Option<TaskId> {
        self.threads.get(&thread).map(|info| info.task)
    }

    pub fn last_cpu_burst(&self, thread: ThreadId) -> Option<u64> {
        self.threads.get(&thread).and_then(|info| info.last_cpu_burst)
    }

    pub fn is_killed(&self, thread: ThreadId) -> bool {
        self.status(thread).is_some_and(|s| s.is_killed())
    }

    /// Threads in the high queue, head first
    pub fn high_queue(&self) -> Vec<ThreadId> {
        self.high.snapshot()
    }

    /// Threads in the low queue, head first
    pub fn low_queue(&self) -> Vec<ThreadId> {
        self.low.snapshot()
    }

    /// Number of Ready threads across both queues
    pub fn runnable_count(&self) -> usize {
        self.high.len() + self.low.len()
    }

    pub fn has_runnable_threads(&self) -> bool {
        !self.high.is_empty() || !self.low.is_empty()
    }

    /// Returns a reference to the audit log
    pub fn audit_log(&self) -> &[ScheduleEvent] {
        &self.audit_log
    }

    /// Clears the audit log
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    fn queue_mut(&mut self, level: QueueLevel) -> &mut RunQueue {
        match level {
            QueueLevel::High => &mut self.high,
            QueueLevel::Low => &mut self.low,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler_with_threads(n: usize) -> (Scheduler, TaskId, Vec<ThreadId>) {
        let mut scheduler = Scheduler::new();
        let task = TaskId::new();
        let threads: Vec<ThreadId> = (0..n).map(|_| ThreadId::new()).collect();
        for &thread in &threads {
            scheduler.add_thread(thread, task, 0);
        }
        (scheduler, task, threads)
    }

    /// Runs `thread` from `start` for `burst` ticks and preempts it
    fn run_for(scheduler: &mut Scheduler, thread: ThreadId, start: u64, burst: u64) {
        let selection = scheduler.select_next(start).unwrap();
        assert_eq!(selection.thread, thread);
        scheduler.preempt_current(start + burst);
    }

    #[test]
    fn test_scheduler_creation() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.runnable_count(), 0);
        assert_eq!(scheduler.current(), None);
        assert!(!scheduler.has_runnable_threads());
    }

    #[test]
    fn test_new_threads_start_high() {
        let (scheduler, _, threads) = scheduler_with_threads(2);
        assert_eq!(scheduler.high_queue(), threads);
        assert!(scheduler.low_queue().is_empty());
        assert_eq!(scheduler.status(threads[0]), Some(ThreadStatus::Ready));
        assert_eq!(scheduler.last_cpu_burst(threads[0]), None);
    }

    #[test]
    fn test_round_robin_ordering() {
        let (mut scheduler, _, threads) = scheduler_with_threads(3);
        assert_eq!(scheduler.select_next(0).unwrap().thread, threads[0]);
        scheduler.preempt_current(5);
        assert_eq!(scheduler.select_next(5).unwrap().thread, threads[1]);
        scheduler.preempt_current(10);
        assert_eq!(scheduler.select_next(10).unwrap().thread, threads[2]);
        scheduler.preempt_current(15);
        assert_eq!(scheduler.select_next(15).unwrap().thread, threads[0]);
    }

    #[test]
    fn test_short_burst_requeues_high() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        run_for(&mut scheduler, threads[0], 0, 10);
        assert_eq!(scheduler.last_cpu_burst(threads[0]), Some(10));
        assert_eq!(scheduler.high_queue(), vec![threads[0]]);
    }

    #[test]
    fn test_burst_at_threshold_stays_high() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        run_for(&mut scheduler, threads[0], 0, 30);
        assert_eq!(scheduler.high_queue(), vec![threads[0]]);
    }

    #[test]
    fn test_long_burst_requeues_low() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        run_for(&mut scheduler, threads[0], 0, 45);
        assert_eq!(scheduler.last_cpu_burst(threads[0]), Some(45));
        assert!(scheduler.high_queue().is_empty());
        assert_eq!(scheduler.low_queue(), vec![threads[0]]);
    }

    #[test]
    fn test_high_queue_preferred_with_short_quantum() {
        let (mut scheduler, _, threads) = scheduler_with_threads(2);
        // threads[0] becomes a long-burst thread
        run_for(&mut scheduler, threads[0], 0, 45);
        let selection = scheduler.select_next(45).unwrap();
        assert_eq!(selection.thread, threads[1]);
        assert_eq!(selection.level, QueueLevel::High);
        assert_eq!(selection.quantum_ticks, 30);
    }

    #[test]
    fn test_low_queue_gets_long_quantum() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        run_for(&mut scheduler, threads[0], 0, 45);
        let selection = scheduler.select_next(45).unwrap();
        assert_eq!(selection.level, QueueLevel::Low);
        assert_eq!(selection.quantum_ticks, 100);
    }

    #[test]
    fn test_idle_when_empty() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.select_next(0), None);
        assert!(matches!(
            scheduler.audit_log().last(),
            Some(ScheduleEvent::Idle { .. })
        ));
    }

    #[test]
    fn test_nested_suspend_and_resume() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        let thread = threads[0];
        scheduler.select_next(0);

        assert_eq!(scheduler.suspend(thread, 1).unwrap(), (1, true));
        assert_eq!(scheduler.current(), None);
        assert_eq!(scheduler.suspend(thread, 2).unwrap(), (2, false));
        assert_eq!(scheduler.status(thread).unwrap().wait_depth(), 2);

        assert_eq!(
            scheduler.resume(thread, 3).unwrap(),
            ThreadStatus::Waiting(NonZeroU32::MIN)
        );
        assert!(!scheduler.has_runnable_threads());
        assert_eq!(scheduler.resume(thread, 4).unwrap(), ThreadStatus::Ready);
        assert_eq!(scheduler.high_queue(), vec![thread]);
    }

    #[test]
    fn test_suspend_ready_thread_leaves_queue() {
        let (mut scheduler, _, threads) = scheduler_with_threads(2);
        assert_eq!(scheduler.suspend(threads[1], 0).unwrap(), (1, false));
        assert_eq!(scheduler.high_queue(), vec![threads[0]]);
    }

    #[test]
    fn test_resume_uses_burst_placement() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        let thread = threads[0];
        run_for(&mut scheduler, thread, 0, 45);
        scheduler.select_next(45);
        scheduler.suspend(thread, 50).unwrap();
        scheduler.resume(thread, 60).unwrap();
        assert_eq!(scheduler.low_queue(), vec![thread]);
    }

    #[test]
    fn test_resume_not_waiting_rejected() {
        let (mut scheduler, _, threads) = scheduler_with_threads(2);
        let before_high = scheduler.high_queue();

        assert_eq!(
            scheduler.resume(threads[0], 0),
            Err(KernelError::NotWaiting(threads[0]))
        );
        assert_eq!(scheduler.high_queue(), before_high);
        assert_eq!(scheduler.status(threads[0]), Some(ThreadStatus::Ready));
        assert!(matches!(
            scheduler.audit_log().last(),
            Some(ScheduleEvent::ResumeRejected { .. })
        ));
    }

    #[test]
    fn test_kill_removes_from_queues() {
        let (mut scheduler, _, threads) = scheduler_with_threads(2);
        assert_eq!(scheduler.kill(threads[0], 0), Ok(false));
        assert_eq!(scheduler.high_queue(), vec![threads[1]]);
        assert!(scheduler.is_killed(threads[0]));
        assert_eq!(
            scheduler.kill(threads[0], 0),
            Err(KernelError::ThreadKilled(threads[0]))
        );
    }

    #[test]
    fn test_kill_running_clears_current() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        scheduler.select_next(0);
        assert_eq!(scheduler.kill(threads[0], 5), Ok(true));
        assert_eq!(scheduler.current(), None);
        assert_eq!(scheduler.preempt_current(6), None);
    }

    #[test]
    fn test_killed_thread_cannot_suspend_or_resume() {
        let (mut scheduler, _, threads) = scheduler_with_threads(1);
        scheduler.kill(threads[0], 0).unwrap();
        assert!(scheduler.suspend(threads[0], 1).is_err());
        assert!(scheduler.resume(threads[0], 1).is_err());
    }

    #[test]
    fn test_audit_log_interleaving() {
        let (mut scheduler, _, threads) = scheduler_with_threads(2);
        scheduler.clear_audit_log();

        scheduler.select_next(0);
        scheduler.preempt_current(30);
        scheduler.select_next(30);

        let log = scheduler.audit_log();
        assert_eq!(log.len(), 3);
        assert!(matches!(log[0], ScheduleEvent::Dispatched { thread, .. } if thread == threads[0]));
        assert!(matches!(
            log[1],
            ScheduleEvent::Preempted { thread, burst_ticks: 30, requeued_to: QueueLevel::High, .. }
                if thread == threads[0]
        ));
        assert!(matches!(log[2], ScheduleEvent::Dispatched { thread, .. } if thread == threads[1]));
    }

    #[test]
    fn test_deterministic_behavior() {
        let task = TaskId::new();
        let t1 = ThreadId::new();
        let t2 = ThreadId::new();

        let mut sched1 = Scheduler::new();
        let mut sched2 = Scheduler::new();
        for sched in [&mut sched1, &mut sched2] {
            sched.add_thread(t1, task, 0);
            sched.add_thread(t2, task, 0);
        }

        assert_eq!(sched1.select_next(0), sched2.select_next(0));
        sched1.preempt_current(40);
        sched2.preempt_current(40);
        assert_eq!(sched1.select_next(40), sched2.select_next(40));
    }
}
