// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::core::status::{CallStatus, TaskStatus};

use super::task_spec::TaskHandle;

/// Opaque state or parameter handed to routines.
pub type TaskState = Arc<dyn Any + Send + Sync>;

/// Task body. Called repeatedly until it returns `Done` or `Error`.
pub type Routine = Arc<dyn Fn(&RoutineCall<'_>) -> CallStatus + Send + Sync>;

/// Completion hook. Receives the task's final status and returns the status
/// waiters should observe.
pub type CompletionFn = Arc<dyn Fn(&CompletionCall<'_>, TaskStatus) -> TaskStatus + Send + Sync>;

/// Arguments of one routine call.
pub struct RoutineCall<'a> {
    pub(crate) state: &'a TaskState,
    pub(crate) param: Option<&'a TaskState>,
    pub thread_num: u32,
    pub call_num: u32,
    pub task: TaskHandle,
}

impl RoutineCall<'_> {
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    pub fn param<T: Any>(&self) -> Option<&T> {
        self.param.and_then(|p| p.downcast_ref::<T>())
    }
}

/// Arguments of a completion hook call.
pub struct CompletionCall<'a> {
    pub(crate) state: &'a TaskState,
    pub(crate) param: Option<&'a TaskState>,
    pub task: TaskHandle,
}

impl CompletionCall<'_> {
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    pub fn param<T: Any>(&self) -> Option<&T> {
        self.param.and_then(|p| p.downcast_ref::<T>())
    }
}

/// Identity of a (state, routine) pair in the thread assignment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AssignmentKey {
    state: usize,
    routine: usize,
}

/// What a task runs: shared state, a per-task parameter, the routine and an
/// optional completion hook.
///
/// Tasks whose entry points share both the state and the routine `Arc` share
/// one thread assignment, so the threading policy applies across all of them.
/// Build one `EntryPoint` per component and clone it per submission with
/// [`with_param`](Self::with_param).
#[derive(Clone)]
pub struct EntryPoint {
    pub(crate) state: TaskState,
    pub(crate) param: Option<TaskState>,
    pub(crate) routine: Routine,
    pub(crate) complete: Option<CompletionFn>,
    pub(crate) required_threads: usize,
    pub(crate) name: Cow<'static, str>,
}

impl EntryPoint {
    pub fn new<S, F>(state: Arc<S>, routine: F) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&RoutineCall<'_>) -> CallStatus + Send + Sync + 'static,
    {
        Self::from_parts(state, Arc::new(routine))
    }

    pub fn from_parts(state: TaskState, routine: Routine) -> Self {
        Self {
            state,
            param: None,
            routine,
            complete: None,
            required_threads: 1,
            name: Cow::Borrowed("task"),
        }
    }

    pub fn with_param<P: Any + Send + Sync>(mut self, param: P) -> Self {
        self.param = Some(Arc::new(param));
        self
    }

    pub fn with_completion<F>(mut self, complete: F) -> Self
    where
        F: Fn(&CompletionCall<'_>, TaskStatus) -> TaskStatus + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(complete));
        self
    }

    /// Threads a task may use at once. `0` means the whole pool.
    pub fn with_required_threads(mut self, threads: usize) -> Self {
        self.required_threads = threads;
        self
    }

    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn assignment_key(&self) -> AssignmentKey {
        AssignmentKey {
            state: Arc::as_ptr(&self.state) as *const () as usize,
            routine: Arc::as_ptr(&self.routine) as *const () as usize,
        }
    }

    pub(crate) fn routine_call(&self, task: TaskHandle, thread_num: u32, call_num: u32) -> RoutineCall<'_> {
        RoutineCall {
            state: &self.state,
            param: self.param.as_ref(),
            thread_num,
            call_num,
            task,
        }
    }

    pub(crate) fn completion_call(&self, task: TaskHandle) -> CompletionCall<'_> {
        CompletionCall {
            state: &self.state,
            param: self.param.as_ref(),
            task,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("required_threads", &self.required_threads)
            .field("has_param", &self.param.is_some())
            .field("has_completion", &self.complete.is_some())
            .finish()
    }
}
