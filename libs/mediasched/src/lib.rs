// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![allow(clippy::type_complexity)] // Routine/callback trait objects are clear in context

//! Task scheduler core for media encode, decode and VPP sessions.
//!
//! Work is submitted as [`TaskSpec`]s against a [`Scheduler`]. Each task names
//! the tasks and resource keys it depends on, the resource keys it produces,
//! and a [`ThreadingPolicy`] that caps how many workers may run tasks sharing
//! its (state, routine) identity. Workers pick eligible tasks, run the routine
//! with the scheduler lock released, and report completion, which resolves or
//! aborts dependents.

pub mod core;

pub use core::{
    CallStatus, ChannelEventSource, CompletionCall, DependencyKey, EntryPoint, HardwareEventSource, HardwareSignal,
    OwnerId, PerformanceMessage, Result, RoutineCall, Scheduler, SchedulerBuilder,
    SchedulerConfig, SchedulerError, SchedulerStats, SchedulerStatus, SchedulerUniqueId,
    Session, SessionComponent, TaskHandle, TaskPriority, TaskSpec, TaskStatus, ThreadingPolicy,
    MAX_DEPENDENCIES,
};
