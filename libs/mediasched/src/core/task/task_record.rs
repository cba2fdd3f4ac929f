// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::panic::Location;
use std::time::{Duration, Instant};

use crate::core::graph::DependencyKey;
use crate::core::status::{TaskPriority, TaskStatus};

use super::entry_point::EntryPoint;
use super::task_spec::{OwnerId, TaskHandle};
use super::thread_assignment::ThreadingPolicy;

/// Progress of the routine itself, as opposed to the published result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecStatus {
    NeedContinue,
    Done,
    Failed(TaskStatus),
}

/// One pool slot. Slots are created once and reset on every reuse.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub task_id: usize,
    pub job_id: u32,
    pub in_use: bool,

    pub exec: ExecStatus,
    pub op_res: TaskStatus,
    /// A waiter observed the failed result; the slot may be reclaimed.
    pub result_consumed: bool,

    pub entry: Option<EntryPoint>,
    pub policy: ThreadingPolicy,
    pub priority: TaskPriority,
    pub owner: OwnerId,
    pub assignment: Option<usize>,
    pub produced: Vec<DependencyKey>,
    pub submitted_at: Option<&'static Location<'static>>,

    pub required_threads: usize,
    pub occupancy: usize,
    pub thread_mask: u64,
    pub number_of_calls: u32,

    pub waiting: bool,
    pub time_last_enter: Option<Instant>,
    pub hw_counter_last_enter: u64,
    pub time_spent: Duration,
    pub time_overhead: Duration,
}

impl TaskRecord {
    pub fn new(task_id: usize) -> Self {
        Self {
            task_id,
            job_id: 0,
            in_use: false,
            exec: ExecStatus::NeedContinue,
            op_res: TaskStatus::InExecution,
            result_consumed: false,
            entry: None,
            policy: ThreadingPolicy::default(),
            priority: TaskPriority::default(),
            owner: OwnerId::default(),
            assignment: None,
            produced: Vec::new(),
            submitted_at: None,
            required_threads: 1,
            occupancy: 0,
            thread_mask: 0,
            number_of_calls: 0,
            waiting: false,
            time_last_enter: None,
            hw_counter_last_enter: 0,
            time_spent: Duration::ZERO,
            time_overhead: Duration::ZERO,
        }
    }

    /// Clear everything tied to the previous submission. Identity stays.
    pub fn reset(&mut self) {
        let task_id = self.task_id;
        let job_id = self.job_id;
        *self = Self::new(task_id);
        self.job_id = job_id;
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.task_id as u32, self.job_id)
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self.policy, ThreadingPolicy::Dedicated)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_use && self.op_res == TaskStatus::InExecution
    }

    /// Finished and no longer observable as in-flight or unconsumed failure.
    pub fn is_reclaimable(&self) -> bool {
        self.in_use
            && match self.op_res {
                TaskStatus::InExecution => false,
                TaskStatus::Ok => true,
                _ => self.result_consumed,
            }
    }

    pub fn location(&self) -> String {
        self.submitted_at
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}
