// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod error;
pub mod graph;
pub mod hw_event;
pub mod logging;
pub mod scheduler;
pub mod scheduler_unique_id;
pub mod session;
pub mod stats;
pub mod status;
pub mod task;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use graph::{DependencyKey, MAX_DEPENDENCIES};
pub use hw_event::{ChannelEventSource, HardwareEventSource, HardwareSignal};
pub use scheduler::{PerformanceMessage, Scheduler, SchedulerBuilder, SchedulerStatus};
pub use scheduler_unique_id::SchedulerUniqueId;
pub use session::{Session, SessionComponent};
pub use stats::SchedulerStats;
pub use status::{CallStatus, TaskPriority, TaskStatus};
pub use task::{
    CompletionCall, EntryPoint, OwnerId, RoutineCall, TaskHandle, TaskSpec, ThreadingPolicy,
};
