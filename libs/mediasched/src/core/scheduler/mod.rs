// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The scheduler: task pool, ready queues, worker pool and wait/wake.
//!
//! All mutable bookkeeping lives in one [`SchedulerState`] behind a single
//! mutex. Workers release it while a routine or completion hook runs.
//! Workers sleep on their own condition variable; callers of
//! [`Scheduler::synchronize`] sleep on the condition variable of the task slot
//! they wait for.

mod admission;
mod builder;
mod completion;
mod lifecycle;
mod selection;
mod state;
mod sync;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use super::config::SchedulerConfig;
use super::hw_event::{HardwareEventSource, HardwareSignal};
use super::scheduler_unique_id::SchedulerUniqueId;
use super::stats::{AssignmentStats, SchedulerStats, WorkerStats};

pub use builder::SchedulerBuilder;
pub(crate) use state::SchedulerState;

/// Scheduler lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Running,
    Stopping,
    Stopped,
}

/// Out-of-band performance hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceMessage {
    /// Drop working-time history and return the listener to its configured state.
    ResetToDefaults,
    StartHwListening,
    StopHwListening,
}

struct HwListener {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub(crate) struct SchedulerInner {
    id: SchedulerUniqueId,
    config: SchedulerConfig,
    worker_count: usize,
    state: Mutex<SchedulerState>,
    /// One per worker.
    worker_wakeups: Vec<Condvar>,
    /// One per task slot.
    task_done: Vec<Condvar>,
    quit: AtomicBool,
    stopped: AtomicBool,
    hw_counter: AtomicU64,
    hw_source: Arc<dyn HardwareEventSource>,
    hw_signal: Option<HardwareSignal>,
    hw_listener: Mutex<Option<HwListener>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Shuts the pool down when the last [`Scheduler`] clone goes away. Workers
/// hold `SchedulerInner` directly, so they do not keep this alive.
struct SchedulerCore {
    inner: Arc<SchedulerInner>,
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

/// Handle to a running scheduler. Clones share the same pool.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Start a scheduler with `config`.
    pub fn new(config: SchedulerConfig) -> super::Result<Self> {
        SchedulerBuilder::new().with_config(config).build()
    }

    fn inner(&self) -> &Arc<SchedulerInner> {
        &self.core.inner
    }

    pub fn id(&self) -> &SchedulerUniqueId {
        &self.inner().id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner().config
    }

    pub fn worker_threads(&self) -> usize {
        self.inner().worker_count
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.inner();
        if inner.stopped.load(Ordering::Acquire) {
            SchedulerStatus::Stopped
        } else if inner.quit.load(Ordering::Acquire) {
            SchedulerStatus::Stopping
        } else {
            SchedulerStatus::Running
        }
    }

    /// Sender for hardware events when the default channel source is in use.
    pub fn hardware_signal(&self) -> Option<HardwareSignal> {
        self.inner().hw_signal.clone()
    }

    /// Whether two handles drive the same pool.
    pub fn same_scheduler(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Stop the pool. Tasks that never ran resolve as aborted.
    pub fn shutdown(&self) {
        self.inner().shutdown();
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.inner();
        let hw_listening = inner.hw_listener.lock().is_some();
        let state = inner.state.lock();
        SchedulerStats {
            scheduler_id: inner.id.to_string(),
            worker_threads: inner.worker_count,
            max_tasks: state.tasks.len(),
            tasks_in_use: state.tasks.iter().filter(|t| t.in_use).count(),
            tasks_in_flight: state.tasks.iter().filter(|t| t.is_in_flight()).count(),
            tasks_queued: state.queues.len(),
            tasks_busy: state.busy_tasks,
            counters: state.counters,
            hw_events: inner.hw_counter.load(Ordering::Acquire),
            hw_listening,
            dependency_table_entries: state.dependency_table.len(),
            failed_dependency_entries: state.dependency_table.failed_entries(),
            live_dependency_links: state.graph.live_links(),
            assignment_refs: state.assignments.total_refs(),
            assignments: state
                .assignments
                .iter()
                .filter(|e| e.num_refs > 0 || e.occupancy > 0)
                .map(|e| AssignmentStats {
                    name: e.name.clone(),
                    policy: e.policy,
                    num_refs: e.num_refs,
                    occupancy: e.occupancy,
                })
                .collect(),
            workers: state
                .workers
                .iter()
                .enumerate()
                .map(|(index, w)| WorkerStats {
                    index,
                    waiting: w.waiting,
                    calls: w.calls,
                    work_time_ms: w.work_time.as_millis() as u64,
                    wait_time_ms: w.wait_time.as_millis() as u64,
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.inner().id)
            .field("worker_threads", &self.inner().worker_count)
            .field("status", &self.status())
            .finish()
    }
}
