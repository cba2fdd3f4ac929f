// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Builder for [`Scheduler`].

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::core::config::SchedulerConfig;
use crate::core::error::Result;
use crate::core::hw_event::{ChannelEventSource, HardwareEventSource};
use crate::core::scheduler_unique_id::SchedulerUniqueId;

use super::state::SchedulerState;
use super::{Scheduler, SchedulerCore, SchedulerInner};

pub struct SchedulerBuilder {
    config: SchedulerConfig,
    id: Option<SchedulerUniqueId>,
    event_source: Option<Arc<dyn HardwareEventSource>>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            id: None,
            event_source: None,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed id instead of `MEDIASCHED_SCHEDULER_ID` or a generated one.
    pub fn with_id(mut self, id: impl Into<SchedulerUniqueId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Listen to a custom hardware event source. Without one the scheduler
    /// uses a channel and exposes its sender via `Scheduler::hardware_signal`.
    pub fn with_event_source<S: HardwareEventSource + 'static>(mut self, source: S) -> Self {
        self.event_source = Some(Arc::new(source));
        self
    }

    pub fn with_event_source_arc(mut self, source: Arc<dyn HardwareEventSource>) -> Self {
        self.event_source = Some(source);
        self
    }

    /// Validate the configuration and start the worker pool.
    pub fn build(self) -> Result<Scheduler> {
        let config = self.config;
        config.validate()?;
        let worker_count = config.resolved_worker_threads();
        let id = self.id.unwrap_or_default();

        let (hw_source, hw_signal) = match self.event_source {
            Some(source) => (source, None),
            None => {
                let source = ChannelEventSource::new();
                let signal = source.signal();
                (Arc::new(source) as Arc<dyn HardwareEventSource>, Some(signal))
            }
        };

        tracing::debug!(
            "[{}] Building scheduler: {} workers, {} task slots",
            id,
            worker_count,
            config.max_tasks
        );

        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState::new(config.max_tasks, worker_count)),
            worker_wakeups: (0..worker_count).map(|_| Condvar::new()).collect(),
            task_done: (0..config.max_tasks).map(|_| Condvar::new()).collect(),
            quit: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            hw_counter: AtomicU64::new(0),
            hw_source,
            hw_signal,
            hw_listener: Mutex::new(None),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            worker_count,
            config,
            id,
        });
        // Dropping this on an early return shuts down whatever started.
        let scheduler = Scheduler {
            core: Arc::new(SchedulerCore {
                inner: Arc::clone(&inner),
            }),
        };

        inner.spawn_workers()?;
        if inner.config.start_hw_listener {
            inner.start_hw_listener()?;
        }
        Ok(scheduler)
    }
}
