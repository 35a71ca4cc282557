//! Explicit-vs-default argument bookkeeping.
//!
//! When an argument or input object is bound, every property the caller
//! actually wrote is marked here. A resolver can then tell "the caller sent
//! `null` to clear this" apart from "the caller left this out".

use rustc_hash::FxHashSet;

/// Records which properties were explicitly supplied by the caller.
///
/// Names compare case-insensitively. Marks are permanent: nothing ever
/// transitions from set back to unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentTracker {
    set: FxHashSet<String>,
}

impl ArgumentTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as explicitly supplied.
    pub fn mark_as_set(&mut self, name: &str) {
        self.set.insert(normalize(name));
    }

    /// Marks every name in `names` as explicitly supplied.
    pub fn mark_all_as_set<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.set.extend(names.into_iter().map(normalize));
    }

    /// Returns true if `name` was ever marked.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.set.contains(&normalize(name))
    }

    /// Returns the number of distinct names marked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns true if nothing has been marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}
