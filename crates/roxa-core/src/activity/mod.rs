// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Activities: per-thread interpreter contexts.
//!
//! An [`Activity`] is the thread-side handle: the run and guard semaphores,
//! the externally pokeable halt and trace flags, and the random seed. The
//! kernel-side state of an activity (its activation stack, current
//! condition, cached numeric settings) lives inside the kernel and is only
//! touched under the kernel lock; see [`manager`].

pub mod condition;
pub mod frames;
pub mod guard;
pub mod manager;

#[cfg(test)]
mod condition_test;
#[cfg(test)]
mod guard_test;
#[cfg(test)]
mod manager_test;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

use crate::execution::number::NumericForm;
use crate::types::ActivityId;

/// Default NUMERIC DIGITS setting.
pub const DEFAULT_DIGITS: usize = 9;

/// Default NUMERIC FUZZ setting.
pub const DEFAULT_FUZZ: usize = 0;

/// The numeric settings cached from the active frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumericSettings {
    /// NUMERIC DIGITS.
    pub digits: usize,
    /// NUMERIC FUZZ.
    pub fuzz: usize,
    /// NUMERIC FORM.
    pub form: NumericForm,
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
            fuzz: DEFAULT_FUZZ,
            form: NumericForm::Scientific,
        }
    }
}

/// A binary semaphore: post wakes exactly one pending or future wait.
#[derive(Default)]
pub struct Semaphore {
    posted: Mutex<bool>,
    condvar: Condvar,
}

impl Semaphore {
    /// A fresh, unposted semaphore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the semaphore, releasing one waiter.
    pub fn post(&self) {
        let mut posted = self.posted.lock();
        *posted = true;
        self.condvar.notify_one();
    }

    /// Block until posted, consuming the post.
    pub fn wait(&self) {
        let mut posted = self.posted.lock();
        while !*posted {
            self.condvar.wait(&mut posted);
        }
        *posted = false;
    }

    /// Clear any pending post.
    pub fn reset(&self) {
        *self.posted.lock() = false;
    }
}

/// The thread-side activity handle.
///
/// Shared between the owning thread, the activity manager, and any activity
/// that needs to poke this one (halt, guard post, pool termination).
pub struct Activity {
    id: ActivityId,
    run_sem: Semaphore,
    guard_sem: Semaphore,
    halt_description: Mutex<Option<String>>,
    trace_requested: AtomicBool,
    terminate_requested: AtomicBool,
    random_seed: AtomicU64,
}

impl Activity {
    /// Create the handle for a new activity.
    #[must_use]
    pub fn new(id: ActivityId) -> Self {
        Self {
            id,
            run_sem: Semaphore::new(),
            guard_sem: Semaphore::new(),
            halt_description: Mutex::new(None),
            trace_requested: AtomicBool::new(false),
            terminate_requested: AtomicBool::new(false),
            random_seed: AtomicU64::new(Self::generate_seed(id)),
        }
    }

    /// The activity's id.
    #[must_use]
    pub const fn id(&self) -> ActivityId {
        self.id
    }

    /// The run semaphore, used to park an activity waiting for the kernel.
    #[must_use]
    pub const fn run_sem(&self) -> &Semaphore {
        &self.run_sem
    }

    /// The guard semaphore, used for variable-scope waits.
    #[must_use]
    pub const fn guard_sem(&self) -> &Semaphore {
        &self.guard_sem
    }

    /// Tag the activity with a halt request.
    ///
    /// Returns false when a halt is already pending.
    pub fn halt(&self, description: &str) -> bool {
        let mut pending = self.halt_description.lock();
        if pending.is_some() {
            return false;
        }
        *pending = Some(description.to_string());
        true
    }

    /// Take a pending halt request, clearing it.
    pub fn take_halt(&self) -> Option<String> {
        self.halt_description.lock().take()
    }

    /// Whether a halt request is pending.
    #[must_use]
    pub fn halt_pending(&self) -> bool {
        self.halt_description.lock().is_some()
    }

    /// Request an external trace toggle.
    pub fn set_trace(&self, on: bool) {
        self.trace_requested.store(on, Ordering::Release);
    }

    /// Whether external tracing was requested.
    #[must_use]
    pub fn trace_requested(&self) -> bool {
        self.trace_requested.load(Ordering::Acquire)
    }

    /// Ask the activity to leave the pool and exit cleanly.
    pub fn terminate_pool_activity(&self) {
        self.terminate_requested.store(true, Ordering::Release);
        self.run_sem.post();
        self.guard_sem.post();
    }

    /// Whether pool termination was requested.
    #[must_use]
    pub fn terminating(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }

    /// The RANDOM seed.
    #[must_use]
    pub fn random_seed(&self) -> u64 {
        self.random_seed.load(Ordering::Relaxed)
    }

    /// Replace the RANDOM seed.
    pub fn set_random_seed(&self, seed: u64) {
        self.random_seed.store(seed, Ordering::Relaxed);
    }

    /// Advance the seed with a xorshift step, returning the new value.
    pub fn next_random(&self) -> u64 {
        let mut seed = self.random_seed.load(Ordering::Relaxed);
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        self.random_seed.store(seed, Ordering::Relaxed);
        seed
    }

    /// Seed from the clock, perturbed per activity.
    fn generate_seed(id: ActivityId) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0x5EED, |d| d.as_nanos() as u64);
        (now | 1).wrapping_mul(0x9E37_79B9_7F4A_7C15 ^ ((id.index() as u64) << 32))
    }
}
