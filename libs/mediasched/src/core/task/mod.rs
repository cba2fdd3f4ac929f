// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod entry_point;
mod task_record;
mod task_spec;
mod thread_assignment;

pub use entry_point::{CompletionCall, CompletionFn, EntryPoint, Routine, RoutineCall, TaskState};
pub(crate) use entry_point::AssignmentKey;
pub(crate) use task_record::{ExecStatus, TaskRecord};
pub use task_spec::{OwnerId, TaskHandle, TaskSpec};
pub use thread_assignment::ThreadingPolicy;
pub(crate) use thread_assignment::ThreadAssignmentTable;
