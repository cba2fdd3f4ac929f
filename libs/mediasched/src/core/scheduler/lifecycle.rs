// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Thread start-up, shutdown and performance hints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core::error::{Result, SchedulerError};
use crate::core::status::TaskStatus;

use super::worker::{run_hw_listener, run_worker};
use super::{HwListener, PerformanceMessage, Scheduler, SchedulerInner};

impl SchedulerInner {
    pub(crate) fn spawn_workers(self: &Arc<Self>) -> Result<()> {
        let mut workers = self.workers.lock();
        for worker in 0..self.worker_count {
            let scheduler = Arc::clone(self);
            let handle = std::thread::Builder::new()
                .name(format!("{}-worker-{}", self.id, worker))
                .spawn(move || run_worker(scheduler, worker))
                .map_err(|e| SchedulerError::ThreadSpawn(format!("worker {}: {}", worker, e)))?;
            workers.push(handle);
        }
        tracing::info!("[{}] Started {} worker threads", self.id, self.worker_count);
        Ok(())
    }

    pub(crate) fn start_hw_listener(self: &Arc<Self>) -> Result<()> {
        let mut listener = self.hw_listener.lock();
        if listener.is_some() {
            return Ok(());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let scheduler = Arc::clone(self);
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(format!("{}-hw-listener", self.id))
            .spawn(move || run_hw_listener(scheduler, thread_stop))
            .map_err(|e| SchedulerError::ThreadSpawn(format!("hardware listener: {}", e)))?;
        *listener = Some(HwListener { stop, handle });
        Ok(())
    }

    pub(crate) fn stop_hw_listener(&self) {
        let Some(listener) = self.hw_listener.lock().take() else {
            return;
        };
        listener.stop.store(true, Ordering::Release);
        self.hw_source.interrupt();
        if listener.handle.thread().id() == std::thread::current().id() {
            return;
        }
        if listener.handle.join().is_err() {
            tracing::warn!("[{}] Hardware listener panicked", self.id);
        }
    }

    /// Stop accepting work, stop every thread and abort tasks that never
    /// resolved. Routines already running are allowed to finish.
    pub(crate) fn shutdown(&self) {
        if self.quit.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("[{}] Shutting down", self.id);
        self.stop_hw_listener();

        {
            let mut guard = self.state.lock();
            guard.accepting = false;
            self.wake_all(&mut guard);
        }

        let current = std::thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("[{}] Worker thread panicked", self.id);
            }
        }

        let mut guard = self.state.lock();
        let in_flight: Vec<usize> = guard
            .tasks
            .iter()
            .filter(|t| t.is_in_flight() && t.occupancy == 0)
            .map(|t| t.task_id)
            .collect();
        let mut pending = Vec::new();
        for idx in &in_flight {
            if let Some(completion) = self.abort_task(&mut guard, *idx, TaskStatus::Aborted) {
                pending.push(completion);
            }
        }
        guard.queues.clear();
        self.run_pending(&mut guard, pending);
        drop(guard);

        self.stopped.store(true, Ordering::Release);
        tracing::info!(
            "[{}] Stopped ({} unfinished task(s) aborted)",
            self.id,
            in_flight.len()
        );
    }
}

impl Scheduler {
    /// Apply a performance hint.
    pub fn adjust_performance(&self, message: PerformanceMessage) -> Result<()> {
        let inner = self.inner();
        if inner.quit.load(Ordering::Acquire) {
            return Err(SchedulerError::NotRunning);
        }
        tracing::debug!("[{}] adjust_performance({:?})", inner.id, message);
        match message {
            PerformanceMessage::StartHwListening => inner.start_hw_listener(),
            PerformanceMessage::StopHwListening => {
                inner.stop_hw_listener();
                Ok(())
            }
            PerformanceMessage::ResetToDefaults => {
                inner.state.lock().time_stats.reset(Instant::now());
                if inner.config.start_hw_listener {
                    inner.start_hw_listener()
                } else {
                    inner.stop_hw_listener();
                    Ok(())
                }
            }
        }
    }
}
