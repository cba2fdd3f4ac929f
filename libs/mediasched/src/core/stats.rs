// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Working-time statistics and scheduler snapshots.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::status::TaskPriority;
use super::task::ThreadingPolicy;

const STATS_PERIOD: Duration = Duration::from_millis(2000);
const STATS_PARTS: usize = 4;

/// Working time per priority over a sliding window of `STATS_PERIOD`, kept
/// in `STATS_PARTS` buckets.
#[derive(Debug)]
pub(crate) struct WorkingTimeStats {
    origin: Instant,
    buckets: [[Duration; 3]; STATS_PARTS],
    epochs: [u64; STATS_PARTS],
}

impl WorkingTimeStats {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            buckets: [[Duration::ZERO; 3]; STATS_PARTS],
            epochs: [u64::MAX; STATS_PARTS],
        }
    }

    fn epoch(&self, now: Instant) -> u64 {
        let part = STATS_PERIOD.as_millis() / STATS_PARTS as u128;
        (now.saturating_duration_since(self.origin).as_millis() / part) as u64
    }

    pub fn record(&mut self, priority: TaskPriority, now: Instant, elapsed: Duration) {
        let epoch = self.epoch(now);
        let slot = (epoch % STATS_PARTS as u64) as usize;
        if self.epochs[slot] != epoch {
            self.buckets[slot] = [Duration::ZERO; 3];
            self.epochs[slot] = epoch;
        }
        self.buckets[slot][priority.index()] += elapsed;
    }

    pub fn totals(&self, now: Instant) -> [Duration; 3] {
        let epoch = self.epoch(now);
        let mut totals = [Duration::ZERO; 3];
        for (bucket, &bucket_epoch) in self.buckets.iter().zip(self.epochs.iter()) {
            if bucket_epoch != u64::MAX && bucket_epoch + STATS_PARTS as u64 > epoch {
                for (total, spent) in totals.iter_mut().zip(bucket.iter()) {
                    *total += *spent;
                }
            }
        }
        totals
    }

    /// Whether `priority` is still under its share of recent working time.
    pub fn within_ratio(&self, priority: TaskPriority, now: Instant) -> bool {
        let totals = self.totals(now);
        let total: Duration = totals.iter().sum();
        if total.is_zero() {
            return true;
        }
        totals[priority.index()].as_micros() * 100
            <= u128::from(priority.time_ratio()) * total.as_micros()
    }

    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TaskCounters {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub panics: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub index: usize,
    pub waiting: bool,
    pub calls: u64,
    pub work_time_ms: u64,
    pub wait_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentStats {
    pub name: String,
    pub policy: ThreadingPolicy,
    pub num_refs: usize,
    pub occupancy: usize,
}

/// Point-in-time view of a scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub scheduler_id: String,
    pub worker_threads: usize,
    pub max_tasks: usize,
    pub tasks_in_use: usize,
    pub tasks_in_flight: usize,
    pub tasks_queued: usize,
    /// Tasks parked after reporting `Busy`.
    pub tasks_busy: usize,
    pub counters: TaskCounters,
    pub hw_events: u64,
    pub hw_listening: bool,
    pub dependency_table_entries: usize,
    pub failed_dependency_entries: usize,
    pub live_dependency_links: usize,
    pub assignment_refs: usize,
    pub assignments: Vec<AssignmentStats>,
    pub workers: Vec<WorkerStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_blocks_dominant_normal() {
        let origin = Instant::now();
        let mut stats = WorkingTimeStats::new(origin);
        stats.record(TaskPriority::Normal, origin, Duration::from_millis(90));
        stats.record(TaskPriority::Low, origin, Duration::from_millis(10));

        assert!(!stats.within_ratio(TaskPriority::Normal, origin));
        assert!(stats.within_ratio(TaskPriority::Low, origin));
        assert!(stats.within_ratio(TaskPriority::High, origin));
    }

    #[test]
    fn test_old_buckets_expire() {
        let origin = Instant::now();
        let mut stats = WorkingTimeStats::new(origin);
        stats.record(TaskPriority::Normal, origin, Duration::from_millis(50));
        let later = origin + STATS_PERIOD + Duration::from_millis(600);
        assert_eq!(stats.totals(later), [Duration::ZERO; 3]);
        assert!(stats.within_ratio(TaskPriority::Normal, later));
    }

    #[test]
    fn test_empty_window_allows_everything() {
        let stats = WorkingTimeStats::new(Instant::now());
        for priority in TaskPriority::SCAN_ORDER {
            assert!(stats.within_ratio(priority, Instant::now()));
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = SchedulerStats {
            scheduler_id: "S1".into(),
            worker_threads: 2,
            max_tasks: 8,
            tasks_in_use: 0,
            tasks_in_flight: 0,
            tasks_queued: 0,
            tasks_busy: 0,
            counters: TaskCounters::default(),
            hw_events: 0,
            hw_listening: false,
            dependency_table_entries: 0,
            failed_dependency_entries: 0,
            live_dependency_links: 0,
            assignment_refs: 0,
            assignments: vec![AssignmentStats {
                name: "vpp".into(),
                policy: ThreadingPolicy::Shared { max_concurrency: 2 },
                num_refs: 0,
                occupancy: 0,
            }],
            workers: Vec::new(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["scheduler_id"], "S1");
        assert_eq!(json["assignments"][0]["policy"]["shared"]["max_concurrency"], 2);
    }
}
