// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use crate::core::graph::DependencyKey;
use crate::core::status::TaskPriority;

use super::entry_point::EntryPoint;
use super::thread_assignment::ThreadingPolicy;

/// External reference to a submitted task.
///
/// `task_id` names the pool slot and never changes; `job_id` changes every
/// time the slot is reused, which is how stale handles are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub task_id: u32,
    pub job_id: u32,
}

impl TaskHandle {
    pub fn new(task_id: u32, job_id: u32) -> Self {
        Self { task_id, job_id }
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}/job#{}", self.task_id, self.job_id)
    }
}

/// Component that submitted a task. Used to drain one component's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OwnerId(pub u64);

/// Submission descriptor.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub(crate) entry: EntryPoint,
    pub(crate) policy: ThreadingPolicy,
    pub(crate) priority: Option<TaskPriority>,
    pub(crate) owner: OwnerId,
    pub(crate) depends_on: Vec<TaskHandle>,
    pub(crate) consumes: Vec<DependencyKey>,
    pub(crate) produces: Vec<DependencyKey>,
}

impl TaskSpec {
    pub fn new(entry: EntryPoint) -> Self {
        Self {
            entry,
            policy: ThreadingPolicy::default(),
            priority: None,
            owner: OwnerId::default(),
            depends_on: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: ThreadingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    /// Run only after `task` resolved.
    pub fn depends_on(mut self, task: TaskHandle) -> Self {
        self.depends_on.push(task);
        self
    }

    /// Run only after the current producer of `key` resolved.
    pub fn consumes(mut self, key: DependencyKey) -> Self {
        self.consumes.push(key);
        self
    }

    /// Become the producer of `key`.
    pub fn produces(mut self, key: DependencyKey) -> Self {
        self.produces.push(key);
        self
    }

    pub fn dependency_count(&self) -> usize {
        self.depends_on.len() + self.consumes.len()
    }
}
