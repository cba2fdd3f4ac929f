// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Duration;

use thiserror::Error;

use super::task::TaskHandle;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Task pool exhausted ({0} slots in use)")]
    PoolExhausted(usize),

    #[error("Invalid task handle: {0}")]
    InvalidHandle(TaskHandle),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Too many dependencies: {0} declared, at most {max} allowed", max = super::graph::MAX_DEPENDENCIES)]
    TooManyDependencies(usize),

    #[error("Entry point '{0}' already registered with a different threading policy")]
    PolicyMismatch(String),

    #[error("Dependency table full ({0} entries)")]
    DependencyTableFull(usize),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task aborted by a failed dependency")]
    Aborted,

    #[error("Task raised an unknown error")]
    Unknown,

    #[error("Task failed with status code {0}")]
    TaskFailed(i32),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
