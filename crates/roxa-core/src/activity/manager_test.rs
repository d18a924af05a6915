// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the activity manager and the kernel lock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::memory::Memory;
use crate::memory::sets::PoolBoundaryPolicy;

use super::manager::ActivityManager;

fn manager() -> ActivityManager {
    ActivityManager::new(Memory::create(PoolBoundaryPolicy::default()))
}

#[test]
fn request_sets_the_current_pointer() {
    let manager = manager();
    let activity = manager.add_activity();
    let access = manager.request(activity.id());
    // The activity holding the lock is the manager's current activity.
    assert_eq!(access.current, Some(activity.id()));
    drop(access);

    let again = manager.request(activity.id());
    assert_eq!(again.current, Some(activity.id()));
}

#[test]
fn handles_resolve_by_id() {
    let manager = manager();
    let activity = manager.add_activity();
    let found = manager.handle(activity.id()).unwrap();
    assert_eq!(found.id(), activity.id());
    assert!(manager.handle(crate::types::ActivityId::new(99)).is_none());
}

#[test]
fn kernel_lock_is_mutually_exclusive() {
    let manager = Arc::new(manager());
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);
        let activity = manager.add_activity();
        workers.push(thread::spawn(move || {
            for _ in 0..25 {
                let access = manager.request(activity.id());
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(50));
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(access);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    // At most one activity ever executed under the lock.
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn waiters_acquire_in_request_order() {
    let manager = Arc::new(manager());
    let first = manager.add_activity();
    let order: Arc<parking_lot::Mutex<Vec<u32>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));

    // Activities exist before the lock is held: creating one needs kernel
    // access of its own.
    let waiters: Vec<_> = (0..3).map(|_| manager.add_activity()).collect();

    // Hold the lock while three waiters queue up in a known order.
    let holder = manager.request(first.id());
    let mut workers = Vec::new();
    for (n, activity) in waiters.into_iter().enumerate() {
        let manager = Arc::clone(&manager);
        let order = Arc::clone(&order);
        workers.push(thread::spawn(move || {
            let access = manager.request(activity.id());
            order.lock().push(n as u32);
            drop(access);
        }));
        // Give each waiter time to join the FIFO before the next.
        thread::sleep(Duration::from_millis(30));
    }
    drop(holder);
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn halt_reaches_the_activity() {
    let manager = manager();
    let activity = manager.add_activity();
    assert!(manager.halt_activity(activity.id(), "stop"));
    assert!(activity.halt_pending());
    assert!(!manager.halt_activity(crate::types::ActivityId::new(55), "stop"));
}

#[test]
fn pool_termination_unblocks() {
    let manager = manager();
    let activity = manager.add_activity();
    manager.terminate_pool_activity(activity.id());
    assert!(activity.terminating());
}

#[test]
fn kernel_allocates_with_roots() {
    let manager = manager();
    let activity = manager.add_activity();
    let mut access = manager.request(activity.id());
    let value = access
        .allocate(crate::object::ObjectData::String("rooted".into()))
        .unwrap();
    assert!(access.memory.is_resident(value));
    // A collection over the kernel roots leaves unreferenced data behind.
    access.collect();
    assert!(!access.memory.is_resident(value));
}