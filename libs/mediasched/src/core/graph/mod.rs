// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Dependency tracking between tasks and produced/consumed resources.

mod dependency_graph;
mod dependency_table;

pub use dependency_graph::{DependencyEvent, DependencyGraph, LinkId};
pub use dependency_table::{DependencyKey, DependencyTable, DependencyTableEntry};

/// Dependency slots per task.
pub const MAX_DEPENDENCIES: usize = 4;
