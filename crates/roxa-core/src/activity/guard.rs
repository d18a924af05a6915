// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Guarded-method concurrency over object variable scopes.
//!
//! A variable scope is RELEASED or RESERVED. A guarded method reserves its
//! scope on entry; re-entry by the holding activity only deepens the nest.
//! A blocked reservation first walks the ownership chain transitively and
//! raises a deadlock error instead of waiting when the chain leads back to
//! the requester.
//!
//! Scope handoff is direct: the releaser assigns the scope to the first
//! waiter before posting its guard semaphore, so a woken waiter owns the
//! scope unless the post was a GUARD WHEN wakeup.

use std::collections::HashSet;

use crate::object::ObjectData;
use crate::types::{ActivityId, ObjRef};

use super::condition::{RexxError, SyntaxError, error_codes};
use super::manager::Kernel;

fn dict_mut(kernel: &mut Kernel, scope: ObjRef) -> &mut crate::object::VariableDictData {
    match &mut kernel.memory.cell_mut(scope).data {
        ObjectData::VariableDict(dict) => dict,
        _ => crate::memory::logic_error("guard operation on a non-scope object"),
    }
}

fn dict(kernel: &Kernel, scope: ObjRef) -> &crate::object::VariableDictData {
    match &kernel.memory.cell(scope).data {
        ObjectData::VariableDict(dict) => dict,
        _ => crate::memory::logic_error("guard operation on a non-scope object"),
    }
}

/// Try to reserve a scope for an activity.
///
/// Returns `Ok(true)` when the scope is now held (fresh or nested). Returns
/// `Ok(false)` when the activity was enqueued as a waiter; the caller must
/// release kernel access, wait on its guard semaphore, and check ownership
/// with [`owns_scope`] on wakeup.
///
/// # Errors
///
/// Raises the deadlock error when waiting would close an ownership cycle.
pub fn reserve_scope(
    kernel: &mut Kernel,
    activity: ActivityId,
    scope: ObjRef,
) -> Result<bool, RexxError> {
    match dict(kernel, scope).reserver {
        None => {
            let entry = dict_mut(kernel, scope);
            entry.reserver = Some(activity);
            entry.nest = 1;
            Ok(true)
        }
        Some(owner) if owner == activity => {
            dict_mut(kernel, scope).nest += 1;
            Ok(true)
        }
        Some(_) => {
            if check_deadlock(kernel, activity, scope) {
                return Err(RexxError::Syntax(SyntaxError::new(
                    error_codes::EXECUTION_DEADLOCK,
                )));
            }
            dict_mut(kernel, scope).waiters.push_back(activity);
            kernel.entry_mut(activity).waiting_scope = scope;
            Ok(false)
        }
    }
}

/// Whether an activity currently holds a scope.
#[must_use]
pub fn owns_scope(kernel: &Kernel, activity: ActivityId, scope: ObjRef) -> bool {
    dict(kernel, scope).reserver == Some(activity)
}

/// Release one nesting level of a reserved scope.
///
/// On full release the scope is handed directly to the first waiter, whose
/// guard semaphore is posted.
pub fn release_scope(kernel: &mut Kernel, activity: ActivityId, scope: ObjRef) {
    let handoff = {
        let entry = dict_mut(kernel, scope);
        if entry.reserver != Some(activity) {
            return;
        }
        entry.nest = entry.nest.saturating_sub(1);
        if entry.nest > 0 {
            return;
        }
        match entry.waiters.pop_front() {
            Some(next) => {
                entry.reserver = Some(next);
                entry.nest = 1;
                Some(next)
            }
            None => {
                entry.reserver = None;
                None
            }
        }
    };

    if let Some(next) = handoff {
        kernel.entry_mut(next).waiting_scope = ObjRef::NULL;
        let handle = std::sync::Arc::clone(&kernel.entry(next).handle);
        handle.guard_sem().post();
    }
}

/// Abandon a pending reservation (wait interrupted).
pub fn cancel_wait(kernel: &mut Kernel, activity: ActivityId, scope: ObjRef) {
    dict_mut(kernel, scope).waiters.retain(|w| *w != activity);
    kernel.entry_mut(activity).waiting_scope = ObjRef::NULL;
}

/// Register a GUARD WHEN watcher: woken on any update to the scope.
pub fn add_watcher(kernel: &mut Kernel, activity: ActivityId, scope: ObjRef) {
    let entry = dict_mut(kernel, scope);
    if !entry.watchers.contains(&activity) {
        entry.watchers.push(activity);
    }
}

/// Remove a GUARD WHEN watcher.
pub fn remove_watcher(kernel: &mut Kernel, activity: ActivityId, scope: ObjRef) {
    dict_mut(kernel, scope).watchers.retain(|w| *w != activity);
}

/// Post every watcher of a scope after a variable update.
pub fn notify_scope_update(kernel: &mut Kernel, scope: ObjRef) {
    let watchers: Vec<ActivityId> = dict(kernel, scope).watchers.clone();
    for watcher in watchers {
        let handle = std::sync::Arc::clone(&kernel.entry(watcher).handle);
        handle.guard_sem().post();
    }
}

/// Walk the ownership chain transitively; true when waiting on `scope`
/// would complete a cycle back to `from`.
#[must_use]
pub fn check_deadlock(kernel: &Kernel, from: ActivityId, scope: ObjRef) -> bool {
    let mut visited: HashSet<ObjRef> = HashSet::new();
    let mut current_scope = scope;
    loop {
        let Some(owner) = dict(kernel, current_scope).reserver else {
            return false;
        };
        if owner == from {
            return true;
        }
        let next_scope = kernel.entry(owner).waiting_scope;
        if next_scope.is_null() || !visited.insert(next_scope) {
            return false;
        }
        current_scope = next_scope;
    }
}
