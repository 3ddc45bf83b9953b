#![forbid(unsafe_code)]

//! Bounded linear snapshot history for undo and reset.
//!
//! # Design
//!
//! [`History<T>`] is a single `VecDeque` of full state snapshots, oldest at
//! the front, newest at the back. Recording a snapshot appends at the back
//! and evicts from the front once the depth bound is exceeded; undo pops
//! the back. There is no redo stack: a linear history matches the store's
//! contract (undo discards, it does not branch).
//!
//! ```text
//! record(S3)
//! ┌───────────────────────────────┐
//! │ [S0, S1, S2, S3]  newest ──►  │
//! └───────────────────────────────┘
//!
//! undo()
//! ┌───────────────────────────────┐
//! │ [S0, S1, S2]                  │   returns S2
//! └───────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. The deque is never empty: the newest entry always mirrors the
//!    store's current state.
//! 2. `len() <= max_depth` after every operation.
//! 3. Eviction removes only the oldest entry.
//!
//! Once eviction has discarded the construction snapshot, the oldest
//! *retained* entry is what `reset_to_oldest` restores. Callers that need
//! the true construction value must keep it themselves.

use std::collections::VecDeque;
use std::fmt;

/// Default number of snapshots retained.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Bounded, ordered log of past state snapshots.
pub struct History<T> {
    /// Snapshots, oldest at the front. Never empty.
    snapshots: VecDeque<T>,
    /// Depth bound, clamped to at least 1.
    max_depth: usize,
}

impl<T: fmt::Debug> fmt::Debug for History<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("depth", &self.snapshots.len())
            .field("max_depth", &self.max_depth)
            .field("newest", &self.snapshots.back())
            .finish()
    }
}

impl<T: Clone> History<T> {
    /// Create a history seeded with the construction snapshot.
    ///
    /// A `max_depth` of 0 is clamped to 1: the newest entry must always
    /// exist to mirror current state.
    #[must_use]
    pub fn new(initial: T, max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        let mut snapshots = VecDeque::new();
        snapshots.push_back(initial);
        Self {
            snapshots,
            max_depth,
        }
    }

    /// Append a snapshot, evicting the oldest entry past the bound.
    pub fn record(&mut self, snapshot: T) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.max_depth {
            self.snapshots.pop_front();
        }
    }

    /// Discard the newest snapshot and return a clone of the entry that
    /// becomes newest. Returns `None` at the floor (a single retained
    /// entry), leaving the history untouched.
    pub fn undo(&mut self) -> Option<T> {
        if self.snapshots.len() <= 1 {
            return None;
        }
        self.snapshots.pop_back();
        self.snapshots.back().cloned()
    }

    /// Truncate to the oldest retained snapshot and return a clone of it.
    pub fn reset_to_oldest(&mut self) -> T {
        let oldest = self
            .snapshots
            .front()
            .expect("history is never empty")
            .clone();
        self.snapshots.clear();
        self.snapshots.push_back(oldest.clone());
        oldest
    }

    /// The newest retained snapshot.
    #[must_use]
    pub fn newest(&self) -> &T {
        self.snapshots.back().expect("history is never empty")
    }

    /// The oldest retained snapshot.
    #[must_use]
    pub fn oldest(&self) -> &T {
        self.snapshots.front().expect("history is never empty")
    }

    /// Iterate snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.snapshots.iter()
    }

    /// Number of retained snapshots (always at least 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Always false; present for API completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The configured depth bound.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
