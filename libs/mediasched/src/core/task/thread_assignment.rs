// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per (state, routine) bookkeeping shared by every task with that identity.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SchedulerError};

use super::entry_point::AssignmentKey;

/// How many workers may run tasks sharing one (state, routine) identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingPolicy {
    /// One worker at a time across all tasks of the entry.
    #[default]
    Intra,
    /// Tasks run independently; each task may use up to its required threads.
    Inter,
    /// Only worker 0 runs these tasks, one at a time.
    Dedicated,
    /// At most `max_concurrency` workers across all tasks of the entry.
    Shared { max_concurrency: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct ThreadAssignment {
    pub key: AssignmentKey,
    pub name: String,
    pub policy: ThreadingPolicy,
    /// Tasks holding a reference to this entry.
    pub num_refs: usize,
    /// Concurrency ceiling across the entry.
    pub task_occupancy: usize,
    /// Workers currently inside a task of this entry.
    pub occupancy: usize,
    pub thread_mask: u64,
    pub last_task: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct ThreadAssignmentTable {
    entries: Vec<ThreadAssignment>,
}

impl ThreadAssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, key: AssignmentKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.num_refs > 0 && e.key == key)
    }

    /// Fail if `key` is live under a different policy.
    pub fn check(&self, key: AssignmentKey, policy: ThreadingPolicy, name: &str) -> Result<()> {
        match self.find(key) {
            Some(idx) if self.entries[idx].policy != policy => {
                Err(SchedulerError::PolicyMismatch(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Take a reference on the entry for `key`, creating it if needed.
    pub fn acquire(
        &mut self,
        key: AssignmentKey,
        policy: ThreadingPolicy,
        name: &str,
        worker_threads: usize,
    ) -> Result<usize> {
        self.check(key, policy, name)?;
        if let Some(idx) = self.find(key) {
            self.entries[idx].num_refs += 1;
            return Ok(idx);
        }

        let task_occupancy = match policy {
            ThreadingPolicy::Intra | ThreadingPolicy::Dedicated => 1,
            ThreadingPolicy::Inter => worker_threads,
            ThreadingPolicy::Shared { max_concurrency } => max_concurrency.clamp(1, worker_threads),
        };
        let entry = ThreadAssignment {
            key,
            name: name.to_string(),
            policy,
            num_refs: 1,
            task_occupancy,
            occupancy: 0,
            thread_mask: 0,
            last_task: None,
        };
        match self.entries.iter().position(|e| e.num_refs == 0) {
            Some(idx) => {
                self.entries[idx] = entry;
                Ok(idx)
            }
            None => {
                self.entries.push(entry);
                Ok(self.entries.len() - 1)
            }
        }
    }

    /// Drop one reference held by `task`.
    pub fn release(&mut self, idx: usize, task: usize) {
        let entry = &mut self.entries[idx];
        debug_assert!(entry.num_refs > 0, "assignment '{}' released twice", entry.name);
        entry.num_refs = entry.num_refs.saturating_sub(1);
        if entry.last_task == Some(task) {
            entry.last_task = None;
        }
    }

    pub fn get(&self, idx: usize) -> &ThreadAssignment {
        &self.entries[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut ThreadAssignment {
        &mut self.entries[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadAssignment> {
        self.entries.iter()
    }

    pub fn total_refs(&self) -> usize {
        self.entries.iter().map(|e| e.num_refs).sum()
    }
}
