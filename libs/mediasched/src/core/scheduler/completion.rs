// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Completion bookkeeping, dependency resolution and wake-ups.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;

use crate::core::graph::DependencyEvent;
use crate::core::scheduler_unique_id::SchedulerUniqueId;
use crate::core::status::{CallStatus, TaskStatus};
use crate::core::task::{EntryPoint, ExecStatus, TaskHandle};

use super::selection::Selected;
use super::state::SchedulerState;
use super::SchedulerInner;

/// Result of one routine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOutcome {
    Returned(CallStatus),
    Panicked,
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// A completion hook waiting to run with the lock released.
pub(crate) struct PendingCompletion {
    entry: EntryPoint,
    handle: TaskHandle,
    status: TaskStatus,
}

impl PendingCompletion {
    pub fn new(entry: Option<&EntryPoint>, handle: TaskHandle, status: TaskStatus) -> Option<Self> {
        let entry = entry.filter(|e| e.complete.is_some())?;
        Some(Self {
            entry: entry.clone(),
            handle,
            status,
        })
    }

    /// Run the hook. A panic becomes `Unknown`; a failure reported for a task
    /// that succeeded replaces `Ok`.
    pub fn run(self, scheduler_id: &SchedulerUniqueId) -> TaskStatus {
        let Some(complete) = self.entry.complete.as_ref() else {
            return self.status;
        };
        let call = self.entry.completion_call(self.handle);
        match catch_unwind(AssertUnwindSafe(|| complete(&call, self.status))) {
            Ok(result) if self.status == TaskStatus::Ok && result.is_failed() => {
                tracing::debug!(
                    "[{}] Completion of {} ({}) reported {}",
                    scheduler_id,
                    self.handle,
                    self.entry.name(),
                    result
                );
                result
            }
            Ok(_) => self.status,
            Err(payload) => {
                tracing::warn!(
                    "[{}] Completion of {} ({}) panicked: {}",
                    scheduler_id,
                    self.handle,
                    self.entry.name(),
                    panic_message(payload.as_ref())
                );
                TaskStatus::Unknown
            }
        }
    }
}

/// Workers to wake after a state change.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Wake {
    pub dedicated: bool,
    pub regular: usize,
}

impl SchedulerInner {
    /// Record the end of one routine call and finish the task if it is done
    /// and nobody else is inside it.
    pub(crate) fn mark_task_completed(
        &self,
        guard: &mut MutexGuard<'_, SchedulerState>,
        worker: usize,
        selected: Selected,
        outcome: CallOutcome,
        elapsed: Duration,
    ) {
        let now = Instant::now();
        let idx = selected.task;
        let state: &mut SchedulerState = guard;

        let context = &mut state.workers[worker];
        context.calls += 1;
        context.work_time += elapsed;
        state
            .time_stats
            .record(state.tasks[idx].priority, now, elapsed);
        state.leave_task(idx, selected.thread_num);
        state.tasks[idx].time_spent += elapsed;

        let (priority, dedicated, owner) = {
            let task = &state.tasks[idx];
            (task.priority, task.is_dedicated(), task.owner)
        };
        match outcome {
            CallOutcome::Panicked => {
                state.counters.panics += 1;
                fail_exec(state, idx, TaskStatus::Unknown);
            }
            CallOutcome::Returned(CallStatus::Error(code)) => {
                fail_exec(state, idx, TaskStatus::Failed(code));
            }
            CallOutcome::Returned(CallStatus::Done) => {
                let task = &mut state.tasks[idx];
                if task.exec == ExecStatus::NeedContinue {
                    task.exec = ExecStatus::Done;
                }
                state.set_waiting(idx, false);
            }
            CallOutcome::Returned(CallStatus::Busy) => {
                state.tasks[idx].time_overhead += elapsed;
                // Another thread may already have finished the task.
                if state.tasks[idx].exec == ExecStatus::NeedContinue {
                    state.set_waiting(idx, true);
                    state.queues.rotate_to_back(priority, dedicated, idx);
                }
            }
            CallOutcome::Returned(CallStatus::Working) => {
                state.set_waiting(idx, false);
                state.queues.rotate_to_back(priority, dedicated, idx);
            }
        }

        // Progress by an owner lets its parked tasks try again.
        if !matches!(outcome, CallOutcome::Returned(CallStatus::Busy))
            && state.reset_waiting_tasks(owner) > 0
        {
            self.wake_all(state);
        }

        let task = &state.tasks[idx];
        if task.occupancy > 0 {
            return;
        }
        let status = match task.exec {
            ExecStatus::NeedContinue => return,
            ExecStatus::Done => TaskStatus::Ok,
            ExecStatus::Failed(status) => status,
        };

        state.queues.remove(priority, dedicated, idx);
        let handle = task.handle();
        let status = match PendingCompletion::new(task.entry.as_ref(), handle, status) {
            Some(completion) => MutexGuard::unlocked(guard, || completion.run(&self.id)),
            None => status,
        };

        let mut pending = Vec::new();
        let wake = self.resolve_task(guard, idx, status, &mut pending);
        self.run_pending(guard, pending);
        self.wake_up_threads(guard, wake);
    }

    /// Publish the final status of `idx` and resolve everything waiting on it.
    ///
    /// Failure records the status on the task's produced resource keys and
    /// aborts the downstream subgraph; abort hooks are queued on `pending`.
    pub(crate) fn resolve_task(
        &self,
        state: &mut SchedulerState,
        idx: usize,
        status: TaskStatus,
        pending: &mut Vec<PendingCompletion>,
    ) -> Wake {
        let mut wake = Wake::default();
        state.set_waiting(idx, false);
        let task = &mut state.tasks[idx];
        task.op_res = status;
        task.exec = if status.is_failed() {
            ExecStatus::Failed(status)
        } else {
            ExecStatus::Done
        };
        let (job_id, handle) = (task.job_id, task.handle());
        self.task_done[idx].notify_all();

        if status.is_failed() {
            state.counters.failed += 1;
            tracing::warn!(
                "[{}] Task {} ({}, submitted at {}) failed: {}",
                self.id,
                handle,
                task.entry.as_ref().map(EntryPoint::name).unwrap_or("?"),
                task.location(),
                status
            );
            state
                .dependency_table
                .mark_failed(&task.produced, idx, job_id, status);

            let mut aborted = Vec::new();
            state.graph.resolve_dependencies(idx, true, |event| {
                if let DependencyEvent::Aborted { node } = event {
                    aborted.push(node);
                }
            });
            for node in aborted {
                if let Some(completion) = self.abort_task(state, node, TaskStatus::Aborted) {
                    pending.push(completion);
                }
            }
        } else {
            state.counters.completed += 1;
            tracing::trace!("[{}] Task {} completed", self.id, handle);
            state
                .dependency_table
                .remove_owned(&task.produced, idx, job_id);

            let mut ready = Vec::new();
            state.graph.resolve_dependencies(idx, false, |event| {
                if let DependencyEvent::Cleared {
                    node,
                    fully_resolved: true,
                } = event
                {
                    ready.push(node);
                }
            });
            for node in ready {
                let dependent = &state.tasks[node];
                if dependent.is_dedicated() {
                    wake.dedicated = true;
                } else {
                    wake.regular += dependent.required_threads;
                }
            }
        }

        state.release_resources(idx);
        wake
    }

    /// Resolve `idx` as aborted without running its routine. Its own
    /// dependents are handled by the caller's graph cascade.
    pub(crate) fn abort_task(
        &self,
        state: &mut SchedulerState,
        idx: usize,
        status: TaskStatus,
    ) -> Option<PendingCompletion> {
        let task = &mut state.tasks[idx];
        if !task.is_in_flight() {
            return None;
        }
        task.op_res = status;
        task.exec = ExecStatus::Failed(status);
        let (priority, dedicated, job_id, handle) =
            (task.priority, task.is_dedicated(), task.job_id, task.handle());
        let completion = PendingCompletion::new(task.entry.as_ref(), handle, status);
        state
            .dependency_table
            .mark_failed(&task.produced, idx, job_id, status);

        state.set_waiting(idx, false);
        state.queues.remove(priority, dedicated, idx);
        state.counters.aborted += 1;
        self.task_done[idx].notify_all();
        tracing::debug!("[{}] Task {} aborted", self.id, handle);
        state.release_resources(idx);
        completion
    }

    /// Run queued completion hooks with the lock released.
    pub(crate) fn run_pending(
        &self,
        guard: &mut MutexGuard<'_, SchedulerState>,
        pending: Vec<PendingCompletion>,
    ) {
        if pending.is_empty() {
            return;
        }
        MutexGuard::unlocked(guard, || {
            for completion in pending {
                completion.run(&self.id);
            }
        });
    }

    /// Wake worker 0 for dedicated work and up to `wake.regular` idle workers
    /// for regular work.
    pub(crate) fn wake_up_threads(&self, state: &mut SchedulerState, wake: Wake) {
        if wake.dedicated && state.workers[0].waiting {
            state.workers[0].waiting = false;
            self.worker_wakeups[0].notify_one();
        }
        let mut remaining = wake.regular;
        for (index, context) in state.workers.iter_mut().enumerate() {
            if remaining == 0 {
                break;
            }
            if context.waiting {
                context.waiting = false;
                self.worker_wakeups[index].notify_one();
                remaining -= 1;
            }
        }
    }

    /// Wake every idle worker.
    pub(crate) fn wake_all(&self, state: &mut SchedulerState) {
        for (index, context) in state.workers.iter_mut().enumerate() {
            context.waiting = false;
            self.worker_wakeups[index].notify_all();
        }
    }
}

fn fail_exec(state: &mut SchedulerState, idx: usize, status: TaskStatus) {
    let task = &mut state.tasks[idx];
    if !matches!(task.exec, ExecStatus::Failed(_)) {
        task.exec = ExecStatus::Failed(status);
    }
    state.set_waiting(idx, false);
}
