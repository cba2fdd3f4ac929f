// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::panic::Location;
use std::sync::atomic::Ordering;

use crate::core::config::MAX_THREADS_PER_TASK;
use crate::core::error::{Result, SchedulerError};
use crate::core::graph::MAX_DEPENDENCIES;
use crate::core::status::TaskStatus;
use crate::core::task::{TaskHandle, TaskSpec, ThreadingPolicy};

use super::completion::Wake;
use super::{Scheduler, SchedulerInner};

impl Scheduler {
    /// Submit a task.
    ///
    /// The task runs once every task it depends on and every current producer
    /// of the keys it consumes has succeeded. If one of them already failed,
    /// the task is admitted already aborted and its completion hook runs with
    /// `Aborted` before this returns. That includes a failed dependency whose
    /// slot was already reclaimed, as long as it was the slot's last job.
    ///
    /// Fails immediately with `PoolExhausted` when every slot is in flight or
    /// holds an unobserved failure.
    #[track_caller]
    pub fn add_task(&self, spec: TaskSpec) -> Result<TaskHandle> {
        self.inner().add_task(spec, Location::caller())
    }
}

impl SchedulerInner {
    fn add_task(&self, spec: TaskSpec, location: &'static Location<'static>) -> Result<TaskHandle> {
        let TaskSpec {
            entry,
            policy,
            priority,
            owner,
            depends_on,
            consumes,
            produces,
        } = spec;

        let dependency_count = depends_on.len() + consumes.len();
        if dependency_count > MAX_DEPENDENCIES {
            return Err(SchedulerError::TooManyDependencies(dependency_count));
        }
        if produces.len() > MAX_DEPENDENCIES {
            return Err(SchedulerError::TooManyDependencies(produces.len()));
        }
        if let ThreadingPolicy::Shared { max_concurrency: 0 } = policy {
            return Err(SchedulerError::Configuration(format!(
                "shared entry point '{}' needs a non-zero concurrency",
                entry.name()
            )));
        }

        let mut guard = self.state.lock();
        if self.quit.load(Ordering::Acquire) || !guard.accepting {
            return Err(SchedulerError::NotRunning);
        }

        let key = entry.assignment_key();
        guard.assignments.check(key, policy, entry.name())?;
        guard.dependency_table.reserve(&produces)?;
        let pool_size = guard.tasks.len();
        if let Some(handle) = depends_on
            .iter()
            .find(|h| h.task_id as usize >= pool_size || h.job_id == 0)
        {
            return Err(SchedulerError::InvalidHandle(*handle));
        }

        let idx = guard.allocate_slot()?;
        let job_id = guard.next_job_id();
        let assignment = guard
            .assignments
            .acquire(key, policy, entry.name(), self.worker_count)?;

        // Collect what is still running upstream. A failed upstream aborts
        // the new task right away.
        let mut inherited = None;
        let mut producers = Vec::with_capacity(dependency_count);
        for handle in &depends_on {
            let upstream = &guard.tasks[handle.task_id as usize];
            if !upstream.in_use || upstream.job_id != handle.job_id {
                // Reclaimed. A failure that was already observed still
                // aborts; anything older than the slot's last job counts as
                // resolved.
                if guard.retired_status(*handle).is_some_and(TaskStatus::is_failed) {
                    inherited = Some(TaskStatus::Aborted);
                }
                continue;
            }
            match upstream.op_res {
                TaskStatus::InExecution => producers.push(upstream.task_id),
                status if status.is_failed() => inherited = Some(TaskStatus::Aborted),
                _ => {}
            }
        }
        for key in &consumes {
            let Some(dependency) = guard.dependency_table.get(*key) else {
                continue;
            };
            if dependency.status.is_failed() {
                inherited = Some(TaskStatus::Aborted);
                continue;
            }
            let upstream = &guard.tasks[dependency.producer];
            if upstream.is_in_flight() && upstream.job_id == dependency.job_id {
                producers.push(dependency.producer);
            }
        }
        producers.sort_unstable();
        producers.dedup();

        let required_threads = match policy {
            ThreadingPolicy::Intra | ThreadingPolicy::Dedicated => 1,
            _ if entry.required_threads == 0 => self.worker_count,
            _ => entry.required_threads,
        }
        .clamp(1, self.worker_count.min(MAX_THREADS_PER_TASK));
        let priority = priority.unwrap_or_default();
        let name = entry.name.clone();

        let state = &mut *guard;
        state.graph.reset(idx);
        let task = &mut state.tasks[idx];
        task.reset();
        task.in_use = true;
        task.job_id = job_id;
        task.entry = Some(entry);
        task.policy = policy;
        task.priority = priority;
        task.owner = owner;
        task.assignment = Some(assignment);
        task.required_threads = required_threads;
        task.produced = produces;
        task.submitted_at = Some(location);
        let handle = task.handle();
        let dedicated = task.is_dedicated();
        state.counters.submitted += 1;

        for key in &state.tasks[idx].produced {
            if let Err(e) = state.dependency_table.register(*key, idx, job_id) {
                tracing::warn!("[{}] {} could not register {}: {}", self.id, handle, key, e);
            }
        }

        if let Some(status) = inherited {
            tracing::debug!(
                "[{}] {} ({}) inherits a failed dependency at admission",
                self.id,
                handle,
                name
            );
            let pending: Vec<_> = self.abort_task(state, idx, status).into_iter().collect();
            self.run_pending(&mut guard, pending);
            return Ok(handle);
        }

        for (level, &producer) in producers.iter().enumerate() {
            if state.graph.set_dependent(producer, idx, level).is_none() {
                tracing::warn!(
                    "[{}] {} could not wait on task {} at level {}",
                    self.id,
                    handle,
                    producer,
                    level
                );
            }
        }

        state.queues.push(priority, dedicated, idx);
        if state.reset_waiting_tasks(owner) > 0 {
            self.wake_all(state);
        }

        tracing::trace!(
            "[{}] Admitted {} ({}, {:?}, {:?}) waiting on {} task(s)",
            self.id,
            handle,
            name,
            policy,
            priority,
            producers.len()
        );

        if state.graph.is_resolved(idx) {
            let wake = if dedicated {
                Wake {
                    dedicated: true,
                    regular: 0,
                }
            } else {
                Wake {
                    dedicated: false,
                    regular: required_threads,
                }
            };
            self.wake_up_threads(state, wake);
        }
        Ok(handle)
    }
}
