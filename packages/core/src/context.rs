//! The context data model: a mutable per-unit-of-work map and the immutable
//! snapshot used to carry it across execution-context boundaries.
//!
//! [`ContextMap`] itself is plain data with no locking: the server crate
//! scopes one instance per task, so it is never touched by two units of work
//! concurrently. The hazard this model answers is *sequential* reuse of an
//! execution resource, which is why [`ContextMap::clear_all`] and
//! [`ContextMap::install_from`] replace state wholesale instead of merging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mutable key/value context for one unit of work.
///
/// Keys are free-form strings compared case-sensitively; the canonical ones
/// live in [`crate::keys::ContextKey`]. Values set during a unit of work must
/// all be removed when it ends, which callers get either from an explicit
/// [`clear_all`](ContextMap::clear_all) or from dropping the scope that owns
/// the map.
#[derive(Debug, Clone, Default)]
pub struct ContextMap {
    entries: BTreeMap<String, String>,
}

impl ContextMap {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, overwriting any previous value.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_owned(), value.into());
    }

    /// Returns the value for `key`, or `None` when absent.
    #[must_use]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.entries.get(key.as_ref()).map(String::as_str)
    }

    /// Removes `key`, returning its previous value when one was present.
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        self.entries.remove(key.as_ref())
    }

    /// Takes an immutable copy of the current entries.
    ///
    /// The snapshot is detached: later mutations of this map do not show
    /// through it.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: self.entries.clone(),
        }
    }

    /// Removes every entry. Idempotent; calling on an empty map is fine.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Replaces the entire entry set with the snapshot's contents.
    ///
    /// This is a replacement, not a merge: whatever a previous unit of work
    /// left on this execution resource is gone afterwards.
    pub fn install_from(&mut self, snapshot: &ContextSnapshot) {
        self.entries.clone_from(&snapshot.entries);
    }

    /// Number of entries currently set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in deterministic (sorted) key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Immutable copy of a [`ContextMap`], taken on a submitting execution
/// context and installed once on the far side of a boundary hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    entries: BTreeMap<String, String>,
}

impl ContextSnapshot {
    /// A snapshot with no entries. Installing it clears the target.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the captured value for `key`, or `None` when absent.
    #[must_use]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.entries.get(key.as_ref()).map(String::as_str)
    }

    /// `true` when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of captured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates captured entries in deterministic (sorted) key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for ContextSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
