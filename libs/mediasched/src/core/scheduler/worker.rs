// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Worker and hardware-listener thread bodies.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::MutexGuard;

use crate::core::status::CallStatus;

use super::completion::{panic_message, CallOutcome};
use super::selection::Selected;
use super::SchedulerInner;

/// Run the routine once. Panics are contained and reported as `Panicked`.
fn invoke(scheduler: &SchedulerInner, selected: &Selected) -> CallOutcome {
    let call = selected
        .entry
        .routine_call(selected.handle, selected.thread_num, selected.call_num);
    match catch_unwind(AssertUnwindSafe(|| (selected.entry.routine)(&call))) {
        Ok(status) => {
            if let CallStatus::Error(code) = status {
                tracing::debug!(
                    "[{}] {} ({}) returned error {}",
                    scheduler.id,
                    selected.handle,
                    selected.entry.name(),
                    code
                );
            }
            CallOutcome::Returned(status)
        }
        Err(payload) => {
            tracing::warn!(
                "[{}] {} ({}) panicked: {}",
                scheduler.id,
                selected.handle,
                selected.entry.name(),
                panic_message(payload.as_ref())
            );
            CallOutcome::Panicked
        }
    }
}

/// Worker loop: select under the lock, run unlocked, record completion.
pub(crate) fn run_worker(scheduler: Arc<SchedulerInner>, worker: usize) {
    tracing::debug!("[{}] Worker {} started", scheduler.id, worker);
    let busy_retry = scheduler.config.busy_retry_interval();
    let idle_timeout = scheduler.config.worker_wait_timeout();

    let mut guard = scheduler.state.lock();
    while !scheduler.quit.load(Ordering::Acquire) {
        let now = Instant::now();
        let hw_counter = scheduler.hw_counter.load(Ordering::Acquire);

        if let Some(selected) = guard.get_task(worker, now, hw_counter, busy_retry) {
            tracing::trace!(
                "[{}] Worker {} runs {} (thread {}, call {})",
                scheduler.id,
                worker,
                selected.handle,
                selected.thread_num,
                selected.call_num
            );
            let started = Instant::now();
            let outcome = MutexGuard::unlocked(&mut guard, || invoke(&scheduler, &selected));
            let elapsed = started.elapsed();
            scheduler.mark_task_completed(&mut guard, worker, selected, outcome, elapsed);
            continue;
        }

        let timeout = if guard.busy_tasks > 0 {
            busy_retry.min(idle_timeout)
        } else {
            idle_timeout
        };
        guard.workers[worker].waiting = true;
        let wait_started = Instant::now();
        scheduler.worker_wakeups[worker].wait_for(&mut guard, timeout);
        let context = &mut guard.workers[worker];
        context.waiting = false;
        context.wait_time += wait_started.elapsed();
    }
    guard.workers[worker].waiting = false;
    drop(guard);
    tracing::debug!("[{}] Worker {} exiting", scheduler.id, worker);
}

/// Listener loop: count hardware events and wake idle workers on each.
pub(crate) fn run_hw_listener(scheduler: Arc<SchedulerInner>, stop: Arc<AtomicBool>) {
    let poll = scheduler.config.hw_event_poll_interval();
    tracing::debug!("[{}] Hardware listener started ({:?} poll)", scheduler.id, poll);
    while !stop.load(Ordering::Acquire) && !scheduler.quit.load(Ordering::Acquire) {
        if scheduler.hw_source.wait_for_event(poll) {
            scheduler.hw_counter.fetch_add(1, Ordering::AcqRel);
            let mut guard = scheduler.state.lock();
            scheduler.wake_all(&mut guard);
        }
    }
    tracing::debug!("[{}] Hardware listener stopped", scheduler.id);
}
