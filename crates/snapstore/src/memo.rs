#![forbid(unsafe_code)]

//! Bounded LRU cache for memoized derived values.
//!
//! # Design
//!
//! Cache keys are built from a dependency list: each dependency's field
//! name and the serialized fingerprint of its current value, joined
//! order-sensitively (`count:3|label:"abc"`). Changing a dependency's
//! value therefore produces a *different* key rather than invalidating
//! the old entry; the LRU bound is what reclaims stale combinations.
//!
//! Values are stored type-erased (`Box<dyn Any>`). Two computations that
//! share a key but produce different result types cannot share a slot:
//! a type-mismatched hit is treated as a miss and overwritten.
//!
//! # Invariants
//!
//! 1. `len() <= capacity()` after every operation.
//! 2. A hit refreshes the entry's recency.
//! 3. Insertion past capacity evicts the least recently used entry.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::record::{FieldKey, Record};

/// Default number of cached dependency/value combinations.
pub(crate) const DEFAULT_MEMO_CAPACITY: usize = 128;

/// Build the order-sensitive cache key for `deps` against `state`.
///
/// Unknown dependency keys contribute a `?` fingerprint (and a warning);
/// they never match a real field's token.
pub(crate) fn memo_key<T: Record>(state: &T, deps: &[FieldKey]) -> String {
    let mut key = String::new();
    for (i, &dep) in deps.iter().enumerate() {
        if i > 0 {
            key.push('|');
        }
        key.push_str(dep);
        key.push(':');
        match state.field_token(dep) {
            Some(token) => key.push_str(&token),
            None => {
                tracing::warn!(field = dep, "memo dependency is not a field of this record");
                key.push('?');
            }
        }
    }
    key
}

/// Type-erased LRU store keyed by dependency fingerprints.
pub(crate) struct MemoCache {
    entries: LruCache<String, Box<dyn Any>>,
}

impl fmt::Debug for MemoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap().get())
            .finish()
    }
}

impl MemoCache {
    /// Create a cache with the given capacity (clamped to at least 1).
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a cached value of type `K`, refreshing its recency.
    /// A key present with a different value type is a miss.
    pub(crate) fn lookup<K: Clone + 'static>(&mut self, key: &str) -> Option<K> {
        self.entries
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<K>())
            .cloned()
    }

    /// Insert (or overwrite) the cached value for `key`.
    pub(crate) fn insert<K: Clone + 'static>(&mut self, key: String, value: &K) {
        self.entries.put(key, Box::new(value.clone()));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
