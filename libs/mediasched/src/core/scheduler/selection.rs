// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Picking the next task for a worker.
//!
//! Two runs over the queues. The priority run skips priorities that used more
//! than their share of recent working time; the regular run takes anything.
//! Within a run, priorities are scanned high to low. Worker 0 looks at the
//! dedicated queue before the regular one. The worker's previous task is
//! tried first, then a task of the same thread assignment, then the oldest
//! eligible task.

use std::time::{Duration, Instant};

use crate::core::status::TaskPriority;
use crate::core::task::{EntryPoint, ExecStatus, TaskHandle, ThreadingPolicy};

use super::state::SchedulerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionRun {
    Priority,
    Regular,
}

/// A task entered by a worker.
pub(crate) struct Selected {
    pub task: usize,
    pub handle: TaskHandle,
    pub thread_num: u32,
    pub call_num: u32,
    pub entry: EntryPoint,
}

fn lowest_free_bit(mask: u64, limit: usize) -> Option<u32> {
    let bit = (!mask).trailing_zeros();
    ((bit as usize) < limit.min(64)).then_some(bit)
}

impl SchedulerState {
    /// Thread number the task may run on next, if its policy has room.
    fn free_thread_number(&self, idx: usize) -> Option<u32> {
        let task = &self.tasks[idx];
        let entry = self.assignments.get(task.assignment?);
        match task.policy {
            ThreadingPolicy::Inter => lowest_free_bit(task.thread_mask, task.required_threads),
            ThreadingPolicy::Intra | ThreadingPolicy::Dedicated => {
                lowest_free_bit(entry.thread_mask, 1)
            }
            ThreadingPolicy::Shared { .. } => {
                if task.occupancy >= task.required_threads {
                    return None;
                }
                lowest_free_bit(entry.thread_mask, entry.task_occupancy)
            }
        }
    }

    /// Whether `worker` may enter task `idx` now.
    pub(crate) fn is_ready_to_run(
        &self,
        idx: usize,
        worker: usize,
        now: Instant,
        hw_counter: u64,
        busy_retry: Duration,
    ) -> Option<u32> {
        let task = &self.tasks[idx];
        if !task.is_in_flight() || task.exec != ExecStatus::NeedContinue {
            return None;
        }
        if task.is_dedicated() && worker != 0 {
            return None;
        }
        if !self.graph.is_resolved(idx) {
            return None;
        }
        if task.waiting {
            if task.occupancy > 0 {
                return None;
            }
            let retry_due = task
                .time_last_enter
                .is_none_or(|entered| now.saturating_duration_since(entered) >= busy_retry);
            if !retry_due && task.hw_counter_last_enter == hw_counter {
                return None;
            }
        }
        self.free_thread_number(idx)
    }

    pub(crate) fn get_task(
        &mut self,
        worker: usize,
        now: Instant,
        hw_counter: u64,
        busy_retry: Duration,
    ) -> Option<Selected> {
        let previous = self.workers[worker]
            .last_task
            .filter(|&(idx, job)| self.tasks[idx].in_use && self.tasks[idx].job_id == job)
            .map(|(idx, _)| idx);
        let previous_assignment = previous.and_then(|idx| self.tasks[idx].assignment);
        let kinds: &[bool] = if worker == 0 { &[true, false] } else { &[false] };

        for run in [SelectionRun::Priority, SelectionRun::Regular] {
            for priority in TaskPriority::SCAN_ORDER {
                if run == SelectionRun::Priority && !self.time_stats.within_ratio(priority, now) {
                    continue;
                }

                if let Some(idx) = previous.filter(|&idx| self.tasks[idx].priority == priority) {
                    if let Some(thread_num) =
                        self.is_ready_to_run(idx, worker, now, hw_counter, busy_retry)
                    {
                        return self.wrap_up_task(idx, worker, thread_num, now, hw_counter);
                    }
                }

                for &dedicated in kinds {
                    let mut first = None;
                    let mut same_assignment = None;
                    for &idx in self.queues.get(priority, dedicated) {
                        let Some(thread_num) =
                            self.is_ready_to_run(idx, worker, now, hw_counter, busy_retry)
                        else {
                            continue;
                        };
                        if previous_assignment.is_some()
                            && self.tasks[idx].assignment == previous_assignment
                        {
                            same_assignment = Some((idx, thread_num));
                            break;
                        }
                        if first.is_none() {
                            first = Some((idx, thread_num));
                        }
                    }
                    if let Some((idx, thread_num)) = same_assignment.or(first) {
                        return self.wrap_up_task(idx, worker, thread_num, now, hw_counter);
                    }
                }
            }
        }
        None
    }

    /// Enter task `idx` on `worker` as thread `thread_num`.
    fn wrap_up_task(
        &mut self,
        idx: usize,
        worker: usize,
        thread_num: u32,
        now: Instant,
        hw_counter: u64,
    ) -> Option<Selected> {
        let task = &mut self.tasks[idx];
        let entry = task.entry.clone()?;
        task.occupancy += 1;
        let call_num = task.number_of_calls;
        task.number_of_calls += 1;
        task.time_last_enter = Some(now);
        task.hw_counter_last_enter = hw_counter;
        let bit = 1u64 << thread_num;
        let uses_task_mask = matches!(task.policy, ThreadingPolicy::Inter);
        if uses_task_mask {
            task.thread_mask |= bit;
        }
        let handle = task.handle();

        if let Some(assignment) = task.assignment {
            let entry = self.assignments.get_mut(assignment);
            entry.occupancy += 1;
            entry.last_task = Some(idx);
            if !uses_task_mask {
                entry.thread_mask |= bit;
            }
        }
        self.workers[worker].last_task = Some((idx, handle.job_id));

        Some(Selected {
            task: idx,
            handle,
            thread_num,
            call_num,
            entry,
        })
    }

    /// Undo what `wrap_up_task` did for one call.
    pub(crate) fn leave_task(&mut self, idx: usize, thread_num: u32) {
        let task = &mut self.tasks[idx];
        task.occupancy = task.occupancy.saturating_sub(1);
        let bit = 1u64 << thread_num;
        let uses_task_mask = matches!(task.policy, ThreadingPolicy::Inter);
        if uses_task_mask {
            task.thread_mask &= !bit;
        }
        if let Some(assignment) = task.assignment {
            let entry = self.assignments.get_mut(assignment);
            entry.occupancy = entry.occupancy.saturating_sub(1);
            if !uses_task_mask {
                entry.thread_mask &= !bit;
            }
        }
    }
}
