// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The activity manager and the kernel lock.
//!
//! At most one activity executes Rexx code at any instant. The kernel lock
//! enforces that with FIFO handoff: a requesting activity enqueues itself
//! and waits until it reaches the front and the lock is free. Acquisition
//! returns a [`KernelAccess`] guard owning the kernel state; releasing is
//! dropping the guard, so no object reference can outlive the access that
//! made it valid (the release/request pairing is the borrow checker's
//! problem now).
//!
//! The kernel state bundles the heap, the per-activity kernel-side entries
//! (activation stack, current condition, cached numeric settings), and the
//! loaded packages. Together they form the collector's root set.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::trace;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::memory::{CollectionStats, Memory, RootSource};
use crate::object::ObjectData;
use crate::package::Package;
use crate::types::{ActivityId, ObjRef};

use super::condition::RexxError;
use super::frames::ActivationStack;
use super::{Activity, NumericSettings};

/// Kernel-side state of one activity.
pub struct ActivityEntry {
    /// The shared thread-side handle.
    pub handle: Arc<Activity>,
    /// The activation stack.
    pub stack: ActivationStack,
    /// The current condition object, or null.
    pub condition: ObjRef,
    /// Numeric settings cached from the top Rexx frame.
    pub settings: NumericSettings,
    /// The guarded scope this activity is blocked on, for deadlock walks.
    pub waiting_scope: ObjRef,
    /// Programs with an in-flight `::REQUIRES` load.
    pub requires: Vec<Box<str>>,
    /// Recursion guard for string conversion during error formatting.
    pub requesting_string: bool,
    /// Whether the activity is attached to the pool.
    pub active: bool,
}

impl ActivityEntry {
    fn new(handle: Arc<Activity>) -> Self {
        Self {
            handle,
            stack: ActivationStack::new(),
            condition: ObjRef::NULL,
            settings: NumericSettings::default(),
            waiting_scope: ObjRef::NULL,
            requires: Vec::new(),
            requesting_string: false,
            active: true,
        }
    }

    /// Refresh the settings cache from the top Rexx frame.
    pub fn refresh_settings(&mut self) {
        if let Some(settings) = self.stack.top_settings() {
            self.settings = settings;
        }
    }
}

/// The kernel state guarded by the kernel lock.
pub struct Kernel {
    /// The object heap.
    pub memory: Memory,
    /// Kernel-side activity entries, indexed by activity id.
    pub entries: Vec<ActivityEntry>,
    /// Loaded packages; a GC root through their literal pools.
    pub packages: Vec<Arc<Package>>,
    /// The activity currently holding the kernel lock.
    pub current: Option<ActivityId>,
}

struct KernelRoots<'a> {
    entries: &'a [ActivityEntry],
    packages: &'a [Arc<Package>],
}

impl RootSource for KernelRoots<'_> {
    fn each_root(&mut self, visit: &mut dyn FnMut(ObjRef)) {
        for entry in self.entries {
            entry.stack.for_each_ref(visit);
            if !entry.condition.is_null() {
                visit(entry.condition);
            }
            if !entry.waiting_scope.is_null() {
                visit(entry.waiting_scope);
            }
        }
        for package in self.packages {
            package.for_each_ref(visit);
        }
    }
}

impl Kernel {
    /// Borrow an activity's kernel-side entry.
    #[must_use]
    pub fn entry(&self, id: ActivityId) -> &ActivityEntry {
        &self.entries[id.index()]
    }

    /// Mutably borrow an activity's kernel-side entry.
    pub fn entry_mut(&mut self, id: ActivityId) -> &mut ActivityEntry {
        &mut self.entries[id.index()]
    }

    /// Run a collection over the full kernel root set.
    pub fn collect(&mut self) -> CollectionStats {
        let mut roots = KernelRoots {
            entries: &self.entries,
            packages: &self.packages,
        };
        self.memory.collect(&mut roots)
    }

    /// Allocate with the full failure ladder, rooted in the kernel.
    ///
    /// # Errors
    ///
    /// Converts storage exhaustion into the resources error.
    pub fn allocate(&mut self, data: ObjectData) -> Result<ObjRef, RexxError> {
        let mut roots = KernelRoots {
            entries: &self.entries,
            packages: &self.packages,
        };
        Ok(self.memory.allocate_with(&mut roots, data)?)
    }

    /// Register a loaded package as a root.
    pub fn add_package(&mut self, package: Arc<Package>) {
        self.packages.push(package);
    }
}

struct LockState {
    held: bool,
    waiting: VecDeque<ActivityId>,
}

/// The process-wide activity collection and its kernel lock.
pub struct ActivityManager {
    state: Mutex<LockState>,
    turnstile: Condvar,
    kernel: Mutex<Kernel>,
    handles: Mutex<HashMap<ActivityId, Arc<Activity>>>,
    next_id: AtomicU32,
}

impl ActivityManager {
    /// Build the manager around a heap.
    #[must_use]
    pub fn new(memory: Memory) -> Self {
        Self {
            state: Mutex::new(LockState {
                held: false,
                waiting: VecDeque::new(),
            }),
            turnstile: Condvar::new(),
            kernel: Mutex::new(Kernel {
                memory,
                entries: Vec::new(),
                packages: Vec::new(),
                current: None,
            }),
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Create a new activity and its kernel-side entry.
    ///
    /// The calling thread becomes the activity's thread; it must request
    /// kernel access before touching any object.
    pub fn add_activity(&self) -> Arc<Activity> {
        let id = ActivityId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(Activity::new(id));
        self.handles.lock().insert(id, Arc::clone(&handle));

        let mut access = self.request(id);
        // The entry table is indexed by id; earlier terminations may have
        // left gaps to fill.
        while access.entries.len() <= id.index() {
            let filler = Arc::new(Activity::new(ActivityId::new(access.entries.len() as u32)));
            access.entries.push(ActivityEntry::new(filler));
        }
        access.entries[id.index()] = ActivityEntry::new(Arc::clone(&handle));
        drop(access);
        handle
    }

    /// Look up an activity handle.
    #[must_use]
    pub fn handle(&self, id: ActivityId) -> Option<Arc<Activity>> {
        self.handles.lock().get(&id).cloned()
    }

    /// Request kernel access for an activity, FIFO.
    ///
    /// Blocks until every earlier requester has held and released the lock.
    pub fn request(&self, id: ActivityId) -> KernelAccess<'_> {
        {
            let mut state = self.state.lock();
            state.waiting.push_back(id);
            while state.held || state.waiting.front() != Some(&id) {
                self.turnstile.wait(&mut state);
            }
            state.waiting.pop_front();
            state.held = true;
        }
        // Uncontended: only the turnstile winner locks the data mutex.
        let mut guard = self.kernel.lock();
        guard.current = Some(id);
        trace!("activity {id} acquired the kernel lock");
        KernelAccess {
            manager: self,
            guard: Some(guard),
            id,
        }
    }

    /// Release and immediately re-request access, letting waiters run.
    pub fn relinquish<'a>(&'a self, access: KernelAccess<'a>) -> KernelAccess<'a> {
        let id = access.id;
        drop(access);
        self.request(id)
    }

    /// Tag an activity with a halt request.
    ///
    /// Returns false when the activity is unknown or already halting.
    pub fn halt_activity(&self, id: ActivityId, description: &str) -> bool {
        self.handle(id).is_some_and(|h| h.halt(description))
    }

    /// Ask an activity to leave the pool and exit cleanly.
    pub fn terminate_pool_activity(&self, id: ActivityId) {
        if let Some(handle) = self.handle(id) {
            handle.terminate_pool_activity();
        }
    }

    fn release(&self, id: ActivityId) {
        let mut state = self.state.lock();
        state.held = false;
        trace!("activity {id} released the kernel lock");
        drop(state);
        self.turnstile.notify_all();
    }
}

/// Exclusive access to the kernel state.
///
/// Dropping the access releases the kernel lock; between a release and the
/// next request no object reference can be dereferenced, because
/// dereferencing requires the access.
pub struct KernelAccess<'a> {
    manager: &'a ActivityManager,
    guard: Option<MutexGuard<'a, Kernel>>,
    id: ActivityId,
}

impl KernelAccess<'_> {
    /// The activity holding this access.
    #[must_use]
    pub const fn activity_id(&self) -> ActivityId {
        self.id
    }
}

impl Deref for KernelAccess<'_> {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        match &self.guard {
            Some(guard) => guard,
            None => crate::memory::logic_error("kernel access used after release"),
        }
    }
}

impl DerefMut for KernelAccess<'_> {
    fn deref_mut(&mut self) -> &mut Kernel {
        match &mut self.guard {
            Some(guard) => guard,
            None => crate::memory::logic_error("kernel access used after release"),
        }
    }
}

impl Drop for KernelAccess<'_> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.current = None;
            drop(guard);
            self.manager.release(self.id);
        }
    }
}
