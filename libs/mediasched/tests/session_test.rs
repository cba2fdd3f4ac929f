// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Sessions sharing a worker pool through join and disjoin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mediasched::core::logging;
use mediasched::{
    CallStatus, EntryPoint, SchedulerBuilder, SchedulerConfig, SchedulerError, Session,
    SessionComponent, TaskPriority, TaskSpec, TaskStatus, ThreadingPolicy,
};

const WAIT: Duration = Duration::from_secs(10);

fn session(id: &str) -> Session {
    logging::try_init_for_tests();
    let scheduler = SchedulerBuilder::new()
        .with_id(id)
        .with_config(SchedulerConfig {
            worker_threads: 2,
            max_tasks: 64,
            worker_wait_timeout_ms: 50,
            ..Default::default()
        })
        .build()
        .unwrap();
    Session::with_scheduler(scheduler)
}

fn thread_recorder(names: &Arc<Mutex<Vec<String>>>) -> EntryPoint {
    let names = names.clone();
    EntryPoint::new(Arc::new(()), move |_| {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        names.lock().push(name);
        CallStatus::Done
    })
}

#[test]
fn test_joined_child_runs_on_parent_pool() {
    let parent = session("parent");
    let child = session("child");
    let names = Arc::new(Mutex::new(Vec::new()));
    let entry = thread_recorder(&names);

    let own = child.submit(SessionComponent::Decode, TaskSpec::new(entry.clone())).unwrap();
    child.synchronize(own, WAIT).unwrap();

    parent.join(&child).unwrap();
    assert!(child.is_joined());
    assert_eq!(parent.child_count(), 1);
    assert!(child.scheduler().same_scheduler(&parent.scheduler()));

    let shared = child.submit(SessionComponent::Decode, TaskSpec::new(entry.clone())).unwrap();
    child.synchronize(shared, WAIT).unwrap();

    child.disjoin().unwrap();
    assert!(!child.is_joined());
    assert_eq!(parent.child_count(), 0);

    let back = child.submit(SessionComponent::Decode, TaskSpec::new(entry)).unwrap();
    child.synchronize(back, WAIT).unwrap();

    let names = names.lock();
    assert_eq!(names.len(), 3);
    assert!(names[0].starts_with("child-worker-"));
    assert!(names[1].starts_with("parent-worker-"));
    assert!(names[2].starts_with("child-worker-"));
}

#[test]
fn test_join_drains_child_work_first() {
    let parent = session("drain-parent");
    let child = session("drain-child");
    let done = Arc::new(AtomicUsize::new(0));
    let entry = {
        let done = done.clone();
        EntryPoint::new(Arc::new(()), move |_| {
            std::thread::sleep(Duration::from_millis(5));
            done.fetch_add(1, Ordering::SeqCst);
            CallStatus::Done
        })
    };

    let handles: Vec<_> = (0..6)
        .map(|_| {
            child
                .submit(
                    SessionComponent::Encode,
                    TaskSpec::new(entry.clone()).with_policy(ThreadingPolicy::Inter),
                )
                .unwrap()
        })
        .collect();
    parent.join(&child).unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 6);

    assert!(child.scheduler().same_scheduler(&parent.scheduler()));

    // The handles belong to the child's own pool.
    child.disjoin().unwrap();
    for handle in handles {
        assert_eq!(child.scheduler().task_status(handle), Some(TaskStatus::Ok));
    }
}

#[test]
fn test_join_rules() {
    let parent = session("rules-parent");
    let child = session("rules-child");
    let other = session("rules-other");

    assert!(matches!(parent.join(&parent), Err(SchedulerError::Session(_))));
    assert!(matches!(child.disjoin(), Err(SchedulerError::Session(_))));

    parent.join(&child).unwrap();
    assert!(matches!(other.join(&child), Err(SchedulerError::Session(_))));
    assert!(matches!(child.join(&other), Err(SchedulerError::Session(_))));
    assert!(matches!(other.join(&parent), Err(SchedulerError::Session(_))));
    assert!(matches!(parent.close(), Err(SchedulerError::Session(_))));

    child.close().unwrap();
    assert!(!child.is_joined());
    parent.close().unwrap();
}

#[test]
fn test_session_priority_and_owner() {
    let session = session("priority");
    session.set_priority(TaskPriority::High);
    assert_eq!(session.priority(), TaskPriority::High);
    assert_ne!(
        session.owner(SessionComponent::Decode),
        session.owner(SessionComponent::Encode)
    );

    let blocker = Arc::new(AtomicUsize::new(0));
    let entry = EntryPoint::new(blocker, |call| {
        if call.state::<AtomicUsize>().unwrap().fetch_add(1, Ordering::SeqCst) < 3 {
            CallStatus::Working
        } else {
            CallStatus::Done
        }
    });
    let handle = session
        .submit(SessionComponent::Vpp, TaskSpec::new(entry))
        .unwrap();
    session.drain();
    assert_eq!(session.scheduler().task_status(handle), Some(TaskStatus::Ok));
}
