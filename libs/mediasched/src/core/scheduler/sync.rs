// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Waiting on tasks from outside the worker pool.

use std::time::{Duration, Instant};

use crate::core::error::{Result, SchedulerError};
use crate::core::graph::DependencyKey;
use crate::core::status::TaskStatus;
use crate::core::task::{OwnerId, TaskHandle};

use super::{Scheduler, SchedulerState};

/// Budget of each wait while draining an owner.
const DRAIN_POLL: Duration = Duration::from_millis(5);

impl Scheduler {
    /// Block until `handle` resolves or `timeout` passes.
    ///
    /// Returns `InvalidHandle` when the slot was already reused before the
    /// call, `Timeout` when the budget runs out, and the task's failure
    /// otherwise. Observing a failure lets the slot be reclaimed; waiters
    /// still asleep at that point get the same failure.
    pub fn synchronize(&self, handle: TaskHandle, timeout: Duration) -> Result<()> {
        let inner = self.inner();
        let idx = handle.task_id as usize;
        let mut guard = inner.state.lock();
        if idx >= guard.tasks.len() {
            return Err(SchedulerError::InvalidHandle(handle));
        }
        let task = &guard.tasks[idx];
        if !task.in_use || task.job_id != handle.job_id {
            return Err(SchedulerError::InvalidHandle(handle));
        }

        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        loop {
            let task = &mut guard.tasks[idx];
            // Reclaimed while we slept. Report what the job resolved to; if
            // the slot has been cycled since, that is no longer known.
            if !task.in_use || task.job_id != handle.job_id {
                return match guard.retired_status(handle) {
                    Some(status) => status.into_result(),
                    None => Err(SchedulerError::InvalidHandle(handle)),
                };
            }
            match task.op_res {
                TaskStatus::InExecution => {}
                TaskStatus::Ok => return Ok(()),
                status => {
                    task.result_consumed = true;
                    return status.into_result();
                }
            }
            if timed_out {
                return Err(SchedulerError::Timeout(timeout));
            }
            timed_out = inner.task_done[idx]
                .wait_until(&mut guard, deadline)
                .timed_out();
        }
    }

    /// Current status of a task, or `None` for a stale handle.
    pub fn task_status(&self, handle: TaskHandle) -> Option<TaskStatus> {
        let state = self.inner().state.lock();
        state
            .tasks
            .get(handle.task_id as usize)
            .filter(|t| t.in_use && t.job_id == handle.job_id)
            .map(|t| t.op_res)
    }

    /// Block until no task of `owner` is in flight.
    pub fn wait_for_all_tasks_completion(&self, owner: OwnerId) {
        self.reset_waiting_status(owner);
        loop {
            let in_flight = self.inner().state.lock().in_flight_of(owner);
            if in_flight.is_empty() {
                return;
            }
            tracing::trace!(
                "[{}] Draining {} task(s) of owner {:?}",
                self.id(),
                in_flight.len(),
                owner
            );
            for handle in in_flight {
                // Outcomes are observed by whoever holds the handle.
                let _ = self.wait_in_flight(handle, DRAIN_POLL);
            }
        }
    }

    /// Wait without consuming a failure, so the submitter still sees it.
    fn wait_in_flight(&self, handle: TaskHandle, timeout: Duration) -> bool {
        let inner = self.inner();
        let idx = handle.task_id as usize;
        let mut guard = inner.state.lock();
        let still_running = |state: &SchedulerState| {
            let task = &state.tasks[idx];
            task.in_use && task.job_id == handle.job_id && !task.op_res.is_terminal()
        };
        if still_running(&*guard) {
            inner.task_done[idx].wait_for(&mut guard, timeout);
        }
        !still_running(&*guard)
    }

    /// Block until the current producer of `key` resolves.
    ///
    /// Returns the producer's failure if it failed, and `Ok` when nothing
    /// produces `key`.
    pub fn wait_for_dependency_resolved(&self, key: DependencyKey, timeout: Duration) -> Result<()> {
        let producer = {
            let state = self.inner().state.lock();
            let Some(entry) = state.dependency_table.get(key) else {
                return Ok(());
            };
            if entry.status.is_failed() {
                return entry.status.into_result();
            }
            TaskHandle::new(entry.producer as u32, entry.job_id)
        };
        match self.synchronize(producer, timeout) {
            Err(SchedulerError::InvalidHandle(_)) => Ok(()),
            other => other,
        }
    }

    /// Let `owner`'s tasks parked on `Busy` run again immediately.
    pub fn reset_waiting_status(&self, owner: OwnerId) {
        let inner = self.inner();
        let mut guard = inner.state.lock();
        if guard.reset_waiting_tasks(owner) > 0 {
            inner.wake_all(&mut guard);
        }
    }

    /// Reclaim every finished slot, including failures nobody waited on, and
    /// forget recorded dependency failures. Returns the number of slots freed.
    pub fn recover(&self) -> usize {
        let inner = self.inner();
        let mut guard = inner.state.lock();
        let freed = guard.scrub_all_finished();
        tracing::debug!("[{}] Recovered {} task slot(s)", inner.id, freed);
        freed
    }
}
