// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulerError};

/// Outcome of a task, as observed by waiters and completion callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not resolved yet.
    InExecution,
    Ok,
    /// A dependency failed; the routine never ran to completion.
    Aborted,
    /// A routine or completion callback panicked.
    Unknown,
    /// The routine reported an error code.
    Failed(i32),
}

impl TaskStatus {
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Aborted | Self::Unknown | Self::Failed(_))
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InExecution)
    }

    /// Map a terminal status onto the crate error type.
    ///
    /// `InExecution` has no error counterpart and maps to `Ok(())`; callers
    /// check [`is_terminal`](Self::is_terminal) first.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::InExecution | Self::Ok => Ok(()),
            Self::Aborted => Err(SchedulerError::Aborted),
            Self::Unknown => Err(SchedulerError::Unknown),
            Self::Failed(code) => Err(SchedulerError::TaskFailed(code)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InExecution => write!(f, "in-execution"),
            Self::Ok => write!(f, "ok"),
            Self::Aborted => write!(f, "aborted"),
            Self::Unknown => write!(f, "unknown"),
            Self::Failed(code) => write!(f, "failed({})", code),
        }
    }
}

/// What a routine reports after one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The task is finished.
    Done,
    /// Made progress, call again.
    Working,
    /// Waiting on hardware; retry after the busy interval or the next hardware event.
    Busy,
    /// The task failed with a routine-specific code.
    Error(i32),
}

/// Coarse selection priority. Higher priorities are scanned first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl TaskPriority {
    /// Scan order used by task selection.
    pub const SCAN_ORDER: [TaskPriority; 3] = [Self::High, Self::Normal, Self::Low];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    /// Largest share of working time (percent) a priority may take before the
    /// priority run skips it.
    pub(crate) fn time_ratio(self) -> u32 {
        match self {
            Self::Low => 100,
            Self::Normal => 75,
            Self::High => 100,
        }
    }
}
