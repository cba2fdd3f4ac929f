// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Sessions: components submitting to a scheduler they may share.
//!
//! A session owns a scheduler. Joining a child session to a parent drains the
//! child's work and moves it onto the parent's scheduler, so independently
//! created pipelines share one worker pool. Disjoining drains again and moves
//! the child back to its own scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::config::SchedulerConfig;
use super::error::{Result, SchedulerError};
use super::scheduler::Scheduler;
use super::status::TaskPriority;
use super::task::{OwnerId, TaskHandle, TaskSpec};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Components that submit work on behalf of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionComponent {
    Decode,
    Encode,
    Vpp,
    Enc,
    Pak,
    Plugin,
}

impl SessionComponent {
    pub const ALL: [SessionComponent; 6] = [
        Self::Decode,
        Self::Encode,
        Self::Vpp,
        Self::Enc,
        Self::Pak,
        Self::Plugin,
    ];

    fn tag(self) -> u64 {
        match self {
            Self::Decode => 1,
            Self::Encode => 2,
            Self::Vpp => 3,
            Self::Enc => 4,
            Self::Pak => 5,
            Self::Plugin => 6,
        }
    }
}

#[derive(Default)]
struct SessionLinks {
    parent: Option<Weak<SessionInner>>,
    children: usize,
}

struct SessionInner {
    id: u64,
    own_scheduler: Scheduler,
    active_scheduler: RwLock<Scheduler>,
    priority: RwLock<TaskPriority>,
    links: Mutex<SessionLinks>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session with its own scheduler.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        Ok(Self::with_scheduler(Scheduler::new(config)?))
    }

    pub fn with_scheduler(scheduler: Scheduler) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Session {} created on scheduler {}", id, scheduler.id());
        Self {
            inner: Arc::new(SessionInner {
                id,
                active_scheduler: RwLock::new(scheduler.clone()),
                own_scheduler: scheduler,
                priority: RwLock::new(TaskPriority::Normal),
                links: Mutex::new(SessionLinks::default()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Owner id stamped on tasks a component submits.
    pub fn owner(&self, component: SessionComponent) -> OwnerId {
        OwnerId((self.inner.id << 8) | component.tag())
    }

    /// Scheduler currently serving this session.
    pub fn scheduler(&self) -> Scheduler {
        self.inner.active_scheduler.read().clone()
    }

    pub fn priority(&self) -> TaskPriority {
        *self.inner.priority.read()
    }

    pub fn set_priority(&self, priority: TaskPriority) {
        *self.inner.priority.write() = priority;
    }

    pub fn is_joined(&self) -> bool {
        self.inner.links.lock().parent.is_some()
    }

    pub fn child_count(&self) -> usize {
        self.inner.links.lock().children
    }

    /// Submit on behalf of `component`. Tasks without an explicit priority
    /// take the session's.
    #[track_caller]
    pub fn submit(&self, component: SessionComponent, spec: TaskSpec) -> Result<TaskHandle> {
        let spec = match spec.priority {
            Some(_) => spec,
            None => spec.with_priority(self.priority()),
        };
        self.scheduler()
            .add_task(spec.with_owner(self.owner(component)))
    }

    pub fn synchronize(&self, handle: TaskHandle, timeout: Duration) -> Result<()> {
        self.scheduler().synchronize(handle, timeout)
    }

    /// Block until no task of any component is in flight.
    pub fn drain(&self) {
        let scheduler = self.scheduler();
        for component in SessionComponent::ALL {
            scheduler.wait_for_all_tasks_completion(self.owner(component));
        }
    }

    /// Move `child` onto this session's scheduler.
    pub fn join(&self, child: &Session) -> Result<()> {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            return Err(SchedulerError::Session("cannot join a session to itself".into()));
        }
        if self.is_joined() {
            return Err(SchedulerError::Session(format!(
                "session {} is itself joined and cannot take children",
                self.id()
            )));
        }
        {
            let links = child.inner.links.lock();
            if links.parent.is_some() {
                return Err(SchedulerError::Session(format!(
                    "session {} is already joined",
                    child.id()
                )));
            }
            if links.children > 0 {
                return Err(SchedulerError::Session(format!(
                    "session {} has joined children",
                    child.id()
                )));
            }
        }

        child.drain();
        *child.inner.active_scheduler.write() = self.scheduler();
        child.inner.links.lock().parent = Some(Arc::downgrade(&self.inner));
        self.inner.links.lock().children += 1;
        tracing::info!("Session {} joined session {}", child.id(), self.id());
        Ok(())
    }

    /// Move this session back onto its own scheduler.
    pub fn disjoin(&self) -> Result<()> {
        if !self.is_joined() {
            return Err(SchedulerError::Session(format!(
                "session {} is not joined",
                self.id()
            )));
        }

        self.drain();
        *self.inner.active_scheduler.write() = self.inner.own_scheduler.clone();
        let parent = self.inner.links.lock().parent.take();
        if let Some(parent) = parent.and_then(|p| p.upgrade()) {
            let mut links = parent.links.lock();
            links.children = links.children.saturating_sub(1);
        }
        tracing::info!("Session {} disjoined", self.id());
        Ok(())
    }

    /// Drain every component. Fails while children are still joined.
    pub fn close(&self) -> Result<()> {
        let children = self.child_count();
        if children > 0 {
            return Err(SchedulerError::Session(format!(
                "session {} still has {} joined child(ren)",
                self.id(),
                children
            )));
        }
        if self.is_joined() {
            self.disjoin()?;
        } else {
            self.drain();
        }
        tracing::debug!("Session {} closed", self.id());
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("priority", &self.priority())
            .field("joined", &self.is_joined())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            worker_threads: 2,
            max_tasks: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_owner_ids_are_per_component() {
        let session = Session::new(config()).unwrap();
        assert_ne!(
            session.owner(SessionComponent::Decode),
            session.owner(SessionComponent::Encode)
        );
        let other = Session::new(config()).unwrap();
        assert_ne!(
            session.owner(SessionComponent::Decode),
            other.owner(SessionComponent::Decode)
        );
    }

    #[test]
    fn test_join_rules() {
        let parent = Session::new(config()).unwrap();
        let child = Session::new(config()).unwrap();
        let grandchild = Session::new(config()).unwrap();

        assert!(parent.join(&parent).is_err());
        parent.join(&child).unwrap();
        assert!(child.scheduler().same_scheduler(&parent.scheduler()));
        assert!(parent.join(&child).is_err());
        assert!(child.join(&grandchild).is_err());
        assert!(grandchild.join(&parent).is_err());
        assert!(parent.close().is_err());

        child.disjoin().unwrap();
        assert!(!child.is_joined());
        assert_eq!(parent.child_count(), 0);
        assert!(!child.scheduler().same_scheduler(&parent.scheduler()));
        assert!(child.disjoin().is_err());
        parent.close().unwrap();
    }
}
