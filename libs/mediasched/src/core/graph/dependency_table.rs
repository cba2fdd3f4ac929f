// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Producer lookup for resource keys.
//!
//! A task that declares it produces a key becomes that key's producer until it
//! succeeds. If it fails, the entry keeps the failure so later consumers of the
//! key are aborted at admission. Failed entries go away when the producing slot
//! is reclaimed.

use std::collections::HashMap;

use crate::core::error::{Result, SchedulerError};
use crate::core::status::TaskStatus;

/// Opaque identity of a produced or consumed resource, such as a frame surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyKey(pub u64);

impl DependencyKey {
    /// Key derived from the address of a resource.
    pub fn of<T: ?Sized>(resource: &T) -> Self {
        Self(resource as *const T as *const () as usize as u64)
    }
}

impl std::fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyTableEntry {
    pub producer: usize,
    pub job_id: u32,
    /// `InExecution` while the producer runs, its failure status afterwards.
    pub status: TaskStatus,
}

#[derive(Debug)]
pub struct DependencyTable {
    entries: HashMap<DependencyKey, DependencyTableEntry>,
    capacity: usize,
}

impl DependencyTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: DependencyKey) -> Option<&DependencyTableEntry> {
        self.entries.get(&key)
    }

    /// Fail unless `keys` can be registered without exceeding capacity.
    pub fn reserve(&self, keys: &[DependencyKey]) -> Result<()> {
        let new_keys = keys
            .iter()
            .filter(|key| !self.entries.contains_key(key))
            .count();
        if self.entries.len() + new_keys > self.capacity {
            return Err(SchedulerError::DependencyTableFull(self.capacity));
        }
        Ok(())
    }

    /// Make `producer` the producer of `key`, replacing any previous one.
    pub fn register(&mut self, key: DependencyKey, producer: usize, job_id: u32) -> Result<()> {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            return Err(SchedulerError::DependencyTableFull(self.capacity));
        }
        self.entries.insert(
            key,
            DependencyTableEntry {
                producer,
                job_id,
                status: TaskStatus::InExecution,
            },
        );
        Ok(())
    }

    /// Record a producer failure on every listed key it still owns.
    pub fn mark_failed(&mut self, keys: &[DependencyKey], producer: usize, job_id: u32, status: TaskStatus) {
        for key in keys {
            if let Some(entry) = self.entries.get_mut(key) {
                if entry.producer == producer && entry.job_id == job_id {
                    entry.status = status;
                }
            }
        }
    }

    /// Drop every listed key the producer still owns.
    pub fn remove_owned(&mut self, keys: &[DependencyKey], producer: usize, job_id: u32) {
        for key in keys {
            if self
                .entries
                .get(key)
                .is_some_and(|e| e.producer == producer && e.job_id == job_id)
            {
                self.entries.remove(key);
            }
        }
    }

    pub fn failed_entries(&self) -> usize {
        self.entries.values().filter(|e| e.status.is_failed()).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE_A: DependencyKey = DependencyKey(0xa0);
    const SURFACE_B: DependencyKey = DependencyKey(0xb0);

    #[test]
    fn test_register_replaces_producer() {
        let mut table = DependencyTable::new(4);
        table.register(SURFACE_A, 1, 10).unwrap();
        table.register(SURFACE_A, 2, 11).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(SURFACE_A).unwrap().producer, 2);

        // The stale producer no longer owns the key.
        table.remove_owned(&[SURFACE_A], 1, 10);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_failure_is_kept_until_removed() {
        let mut table = DependencyTable::new(4);
        table.register(SURFACE_A, 3, 7).unwrap();
        table.register(SURFACE_B, 3, 7).unwrap();
        table.mark_failed(&[SURFACE_A, SURFACE_B], 3, 7, TaskStatus::Failed(-5));
        assert_eq!(table.get(SURFACE_A).unwrap().status, TaskStatus::Failed(-5));
        assert_eq!(table.failed_entries(), 2);

        table.remove_owned(&[SURFACE_A, SURFACE_B], 3, 7);
        assert!(table.is_empty());
    }

    #[test]
    fn test_capacity() {
        let mut table = DependencyTable::new(1);
        table.register(SURFACE_A, 0, 1).unwrap();
        assert!(table.reserve(&[SURFACE_A]).is_ok());
        assert!(matches!(
            table.reserve(&[SURFACE_B]),
            Err(SchedulerError::DependencyTableFull(1))
        ));
        assert!(table.register(SURFACE_B, 0, 1).is_err());
    }

    #[test]
    fn test_key_of_resource_is_stable() {
        let surface = [0u8; 16];
        assert_eq!(DependencyKey::of(&surface), DependencyKey::of(&surface));
    }
}
