//! The scoped "current" context store.
//!
//! One [`ContextMap`] is attached to the running task through tokio
//! task-local storage. A store exists only inside a [`scope`] (or
//! [`sync_scope`] for blocking closures); when the scope's future is dropped
//! — normal return, error, panic, or cancellation — the map goes with it.
//! That drop is what makes "no entry survives into an unrelated unit of work
//! on a reused worker" structural rather than something every exit path must
//! remember to do.
//!
//! Outside any scope the accessors degrade to no-ops: reads come back absent
//! and writes are discarded. Library code can therefore run identically under
//! tests or on stray tasks without panicking.

use std::cell::RefCell;
use std::future::Future;

use obskit_core::{ContextMap, ContextSnapshot};
use tokio::task_local;

task_local! {
    static CURRENT: RefCell<ContextMap>;
}

/// Runs `future` with a fresh, empty store as the task's current context.
pub async fn scope<F>(future: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(RefCell::new(ContextMap::new()), future).await
}

/// Runs `future` with a store pre-loaded from `snapshot`.
///
/// The snapshot replaces the new store's contents wholesale, so nothing from
/// a previous occupant of this execution resource can show through.
pub async fn scope_with<F>(snapshot: ContextSnapshot, future: F) -> F::Output
where
    F: Future,
{
    let mut map = ContextMap::new();
    map.install_from(&snapshot);
    CURRENT.scope(RefCell::new(map), future).await
}

/// Runs a blocking closure with a store pre-loaded from `snapshot`.
///
/// For worker threads outside the async runtime (`spawn_blocking` bodies,
/// hand-rolled executors). The store is dropped when the closure returns or
/// unwinds.
pub fn sync_scope<F, R>(snapshot: ContextSnapshot, f: F) -> R
where
    F: FnOnce() -> R,
{
    let mut map = ContextMap::new();
    map.install_from(&snapshot);
    CURRENT.sync_scope(RefCell::new(map), f)
}

/// `true` when the calling task currently has a store in scope.
#[must_use]
pub fn is_active() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Sets `key` in the current store. No-op outside a scope.
pub fn set(key: impl AsRef<str>, value: impl Into<String>) {
    let _ = CURRENT.try_with(|cell| cell.borrow_mut().set(key.as_ref(), value.into()));
}

/// Reads `key` from the current store. Absent outside a scope.
#[must_use]
pub fn get(key: impl AsRef<str>) -> Option<String> {
    CURRENT
        .try_with(|cell| cell.borrow().get(key.as_ref()).map(str::to_owned))
        .ok()
        .flatten()
}

/// Removes `key` from the current store, returning its previous value.
pub fn remove(key: impl AsRef<str>) -> Option<String> {
    CURRENT
        .try_with(|cell| cell.borrow_mut().remove(key.as_ref()))
        .ok()
        .flatten()
}

/// Immutable copy of the current store. Empty outside a scope.
#[must_use]
pub fn snapshot() -> ContextSnapshot {
    CURRENT
        .try_with(|cell| cell.borrow().snapshot())
        .unwrap_or_default()
}

/// Removes every entry from the current store. Idempotent; no-op outside a
/// scope.
pub fn clear_all() {
    let _ = CURRENT.try_with(|cell| cell.borrow_mut().clear_all());
}

/// Replaces the current store's entries with the snapshot's. No-op outside a
/// scope.
pub fn install_from(snapshot: &ContextSnapshot) {
    let _ = CURRENT.try_with(|cell| cell.borrow_mut().install_from(snapshot));
}

/// `true` when the current store has no entries (or no scope is active).
#[must_use]
pub fn is_empty() -> bool {
    CURRENT
        .try_with(|cell| cell.borrow().is_empty())
        .unwrap_or(true)
}

/// Runs `f` against the current store, returning `None` outside a scope.
/// For multi-entry edits that would otherwise borrow the cell repeatedly.
pub fn with_current<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut ContextMap) -> R,
{
    CURRENT.try_with(|cell| f(&mut cell.borrow_mut())).ok()
}
