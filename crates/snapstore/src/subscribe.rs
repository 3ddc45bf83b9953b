#![forbid(unsafe_code)]

//! Field-keyed subscriber registry with guard-based removal.
//!
//! # Design
//!
//! Callbacks live in a map from field key to a list of `(id, callback)`
//! pairs in registration order, behind `Rc<RefCell<..>>` so the store and
//! every [`Subscription`] guard share one registry. Notification collects
//! strong clones of the callbacks *before* invoking any of them, so a
//! callback may freely re-enter the store (including dropping its own
//! guard) without tripping borrow rules.
//!
//! # Invariants
//!
//! 1. Callbacks under one field are invoked in registration order.
//! 2. Dropping a [`Subscription`] removes exactly the pairings it created.
//! 3. A field whose callback list becomes empty is removed from the map
//!    (no dangling empty entries).
//! 4. Removal is idempotent: a guard cleans up at most once.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::record::FieldKey;

/// A subscriber callback: `(new_state, old_state)`.
pub(crate) type Callback<T> = Rc<dyn Fn(&T, &T)>;

struct RegistryInner<T> {
    next_id: u64,
    fields: FxHashMap<FieldKey, Vec<(u64, Callback<T>)>>,
}

/// Shared registry of field-keyed subscribers.
pub(crate) struct SubscriberRegistry<T> {
    inner: Rc<RefCell<RegistryInner<T>>>,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SubscriberRegistry")
            .field("fields", &inner.fields.len())
            .field("subscribers", &inner.fields.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl<T> SubscriberRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                next_id: 0,
                fields: FxHashMap::default(),
            })),
        }
    }

    /// Register one callback under every key in `fields`. The returned
    /// guard removes all of the pairings together.
    pub(crate) fn register(
        &self,
        fields: &[FieldKey],
        callback: impl Fn(&T, &T) + 'static,
    ) -> Subscription<T> {
        let callback: Callback<T> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let mut entries = Vec::with_capacity(fields.len());
        for &field in fields {
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .fields
                .entry(field)
                .or_default()
                .push((id, Rc::clone(&callback)));
            entries.push((field, id));
        }
        Subscription {
            registry: Rc::downgrade(&self.inner),
            entries,
        }
    }

    /// Strong clones of the callbacks under `field`, in registration
    /// order. The borrow is released before the caller invokes any of
    /// them.
    pub(crate) fn callbacks_for(&self, field: FieldKey) -> Vec<Callback<T>> {
        self.inner
            .borrow()
            .fields
            .get(field)
            .map(|list| list.iter().map(|(_, cb)| Rc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Total registered pairings across all fields.
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.borrow().fields.values().map(Vec::len).sum()
    }

    /// Number of field keys with at least one subscriber.
    #[cfg(test)]
    pub(crate) fn field_count(&self) -> usize {
        self.inner.borrow().fields.len()
    }
}

/// Guard for one registration (possibly spanning several fields).
///
/// Dropping the guard removes the callback pairings it created. The
/// explicit [`unsubscribe`](Subscription::unsubscribe) consumes the guard,
/// so removal can never run twice.
pub struct Subscription<T> {
    registry: Weak<RefCell<RegistryInner<T>>>,
    entries: Vec<(FieldKey, u64)>,
}

impl<T> Subscription<T> {
    /// Remove the registration now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut inner = registry.borrow_mut();
        for (field, id) in self.entries.drain(..) {
            if let Some(list) = inner.fields.get_mut(field) {
                list.retain(|(entry_id, _)| *entry_id != id);
                if list.is_empty() {
                    inner.fields.remove(field);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
