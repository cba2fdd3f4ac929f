// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::error::{Result, SchedulerError};
use crate::core::graph::{DependencyGraph, DependencyTable, MAX_DEPENDENCIES};
use crate::core::stats::{TaskCounters, WorkingTimeStats};
use crate::core::status::{TaskPriority, TaskStatus};
use crate::core::task::{OwnerId, TaskHandle, TaskRecord, ThreadAssignmentTable};

/// Per-worker bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct WorkerContext {
    pub waiting: bool,
    /// Previous task, as (slot, job), for locality.
    pub last_task: Option<(usize, u32)>,
    pub calls: u64,
    pub work_time: Duration,
    pub wait_time: Duration,
}

/// Ready queues by priority and by dedicated/regular.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueues {
    queues: [[VecDeque<usize>; 2]; 3],
}

impl ReadyQueues {
    fn kind(dedicated: bool) -> usize {
        if dedicated { 0 } else { 1 }
    }

    pub fn get(&self, priority: TaskPriority, dedicated: bool) -> &VecDeque<usize> {
        &self.queues[priority.index()][Self::kind(dedicated)]
    }

    pub fn push(&mut self, priority: TaskPriority, dedicated: bool, task: usize) {
        self.queues[priority.index()][Self::kind(dedicated)].push_back(task);
    }

    pub fn remove(&mut self, priority: TaskPriority, dedicated: bool, task: usize) {
        let queue = &mut self.queues[priority.index()][Self::kind(dedicated)];
        if let Some(pos) = queue.iter().position(|&t| t == task) {
            queue.remove(pos);
        }
    }

    /// Move `task` behind everything else of its kind.
    pub fn rotate_to_back(&mut self, priority: TaskPriority, dedicated: bool, task: usize) {
        self.remove(priority, dedicated, task);
        self.push(priority, dedicated, task);
    }

    pub fn len(&self) -> usize {
        self.queues.iter().flatten().map(VecDeque::len).sum()
    }

    pub fn clear(&mut self) {
        self.queues.iter_mut().flatten().for_each(VecDeque::clear);
    }
}

pub(crate) struct SchedulerState {
    pub tasks: Vec<TaskRecord>,
    pub free_slots: Vec<usize>,
    /// Job id and final status of the last job reclaimed from each slot.
    pub retired: Vec<Option<(u32, TaskStatus)>>,
    pub graph: DependencyGraph<MAX_DEPENDENCIES>,
    pub dependency_table: DependencyTable,
    pub assignments: ThreadAssignmentTable,
    pub queues: ReadyQueues,
    pub workers: Vec<WorkerContext>,
    pub time_stats: WorkingTimeStats,
    pub counters: TaskCounters,
    pub job_counter: u32,
    /// Tasks parked after reporting `Busy`.
    pub busy_tasks: usize,
    pub accepting: bool,
}

impl SchedulerState {
    pub fn new(max_tasks: usize, worker_count: usize) -> Self {
        Self {
            tasks: (0..max_tasks).map(TaskRecord::new).collect(),
            // Popped from the back, so slot 0 goes out first.
            free_slots: (0..max_tasks).rev().collect(),
            retired: vec![None; max_tasks],
            graph: DependencyGraph::new(max_tasks),
            dependency_table: DependencyTable::new(max_tasks * 2),
            assignments: ThreadAssignmentTable::new(),
            queues: ReadyQueues::default(),
            workers: (0..worker_count).map(|_| WorkerContext::default()).collect(),
            time_stats: WorkingTimeStats::new(Instant::now()),
            counters: TaskCounters::default(),
            job_counter: 0,
            busy_tasks: 0,
            accepting: true,
        }
    }

    /// Next job id. Wraps back to 1; 0 is never handed out.
    pub fn next_job_id(&mut self) -> u32 {
        self.job_counter = if self.job_counter == u32::MAX {
            1
        } else {
            self.job_counter + 1
        };
        self.job_counter
    }

    /// Claim a free slot, scrubbing finished ones if the free list is empty.
    pub fn allocate_slot(&mut self) -> Result<usize> {
        if self.free_slots.is_empty() {
            self.scrub_completed_tasks();
        }
        self.free_slots
            .pop()
            .ok_or(SchedulerError::PoolExhausted(self.tasks.len()))
    }

    pub fn scrub_completed_tasks(&mut self) -> usize {
        let reclaimable: Vec<usize> = self
            .tasks
            .iter()
            .filter(|t| t.is_reclaimable())
            .map(|t| t.task_id)
            .collect();
        for &idx in &reclaimable {
            self.reclaim_slot(idx);
        }
        reclaimable.len()
    }

    /// Reclaim every finished slot, including failures nobody observed.
    pub fn scrub_all_finished(&mut self) -> usize {
        for task in &mut self.tasks {
            if task.in_use && task.op_res.is_failed() {
                task.result_consumed = true;
            }
        }
        self.scrub_completed_tasks()
    }

    fn reclaim_slot(&mut self, idx: usize) {
        self.set_waiting(idx, false);
        let task = &mut self.tasks[idx];
        debug_assert!(task.assignment.is_none(), "reclaiming task {} with live assignment", idx);
        self.dependency_table
            .remove_owned(&task.produced, idx, task.job_id);
        self.retired[idx] = Some((task.job_id, task.op_res));
        task.reset();
        self.graph.reset(idx);
        self.free_slots.push(idx);
    }

    /// Drop the task's thread-assignment reference. Runs once per submission.
    pub fn release_resources(&mut self, idx: usize) {
        if let Some(assignment) = self.tasks[idx].assignment.take() {
            self.assignments.release(assignment, idx);
        }
    }

    pub fn set_waiting(&mut self, idx: usize, waiting: bool) {
        let task = &mut self.tasks[idx];
        if task.waiting != waiting {
            task.waiting = waiting;
            if waiting {
                self.busy_tasks += 1;
            } else {
                self.busy_tasks -= 1;
            }
        }
    }

    /// Clear busy parking for the owner's in-flight tasks. Returns how many
    /// were parked.
    pub fn reset_waiting_tasks(&mut self, owner: OwnerId) -> usize {
        let parked: Vec<usize> = self
            .tasks
            .iter()
            .filter(|t| t.is_in_flight() && t.waiting && t.owner == owner)
            .map(|t| t.task_id)
            .collect();
        for &idx in &parked {
            self.set_waiting(idx, false);
        }
        parked.len()
    }

    /// Final status of `handle` if it was the last job reclaimed from its slot.
    pub fn retired_status(&self, handle: TaskHandle) -> Option<TaskStatus> {
        match self.retired.get(handle.task_id as usize)? {
            Some((job_id, status)) if *job_id == handle.job_id => Some(*status),
            _ => None,
        }
    }

    pub fn in_flight_of(&self, owner: OwnerId) -> Vec<TaskHandle> {
        self.tasks
            .iter()
            .filter(|t| t.is_in_flight() && t.owner == owner)
            .map(|t| t.handle())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_counter_wraps_to_one() {
        let mut state = SchedulerState::new(1, 2);
        state.job_counter = u32::MAX - 1;
        assert_eq!(state.next_job_id(), u32::MAX);
        assert_eq!(state.next_job_id(), 1);
    }

    #[test]
    fn test_exhaustion_and_scrub() {
        let mut state = SchedulerState::new(2, 2);
        let a = state.allocate_slot().unwrap();
        let b = state.allocate_slot().unwrap();
        assert_eq!((a, b), (0, 1));
        for idx in [a, b] {
            state.tasks[idx].in_use = true;
        }
        assert!(matches!(
            state.allocate_slot(),
            Err(SchedulerError::PoolExhausted(2))
        ));

        // Successes are reclaimed, unobserved failures are not.
        state.tasks[a].op_res = TaskStatus::Ok;
        state.tasks[b].op_res = TaskStatus::Aborted;
        assert_eq!(state.allocate_slot().unwrap(), a);
        assert!(state.allocate_slot().is_err());
        assert_eq!(state.scrub_all_finished(), 1);
        assert_eq!(state.allocate_slot().unwrap(), b);
    }

    #[test]
    fn test_rotate_to_back() {
        let mut queues = ReadyQueues::default();
        for task in 0..3 {
            queues.push(TaskPriority::Normal, false, task);
        }
        queues.rotate_to_back(TaskPriority::Normal, false, 0);
        let order: Vec<usize> = queues.get(TaskPriority::Normal, false).iter().copied().collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(queues.len(), 3);
    }

    #[test]
    fn test_waiting_counter() {
        let mut state = SchedulerState::new(2, 2);
        state.tasks[0].in_use = true;
        state.tasks[0].owner = OwnerId(7);
        state.set_waiting(0, true);
        state.set_waiting(0, true);
        assert_eq!(state.busy_tasks, 1);
        assert_eq!(state.reset_waiting_tasks(OwnerId(8)), 0);
        assert_eq!(state.reset_waiting_tasks(OwnerId(7)), 1);
        assert_eq!(state.busy_tasks, 0);
    }

    #[test]
    fn test_reclaim_clears_parking_and_keeps_outcome() {
        let mut state = SchedulerState::new(1, 2);
        state.tasks[0].in_use = true;
        state.tasks[0].job_id = state.next_job_id();
        let handle = state.tasks[0].handle();
        state.set_waiting(0, true);
        state.tasks[0].op_res = TaskStatus::Failed(-4);
        state.tasks[0].result_consumed = true;

        assert_eq!(state.allocate_slot().unwrap(), 0);
        assert_eq!(state.busy_tasks, 0);
        assert_eq!(state.retired_status(handle), Some(TaskStatus::Failed(-4)));
        assert_eq!(state.retired_status(TaskHandle::new(0, handle.job_id + 1)), None);
        assert_eq!(state.retired_status(TaskHandle::new(5, handle.job_id)), None);
    }
}
