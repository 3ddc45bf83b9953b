#![forbid(unsafe_code)]

//! The state store: one versioned snapshot of a [`Record`], partial
//! updates with field-keyed change notification, bounded undo history,
//! memoized derived reads, and mountable side effects.
//!
//! # Design
//!
//! [`Store<T>`] wraps its state, history, and memo cache in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Cloning a `Store`
//! creates a new handle to the **same** state. All mutating operations
//! run to completion synchronously; the only suspension point is
//! [`dispatch_async`](Store::dispatch_async), which holds no borrow
//! across its await, so interleaved mutations are last-applied-wins.
//!
//! Notification is *supplied-key* based for [`set`](Store::set): every
//! callback subscribed under a field the patch supplies is invoked with
//! `(new, old)` snapshots, whether or not the value actually changed.
//! [`undo`](Store::undo) and [`reset`](Store::reset) have no patch, so
//! they notify on the fields whose values actually differ between the
//! outgoing and incoming snapshots.
//!
//! # Performance
//!
//! | Operation   | Complexity                          |
//! |-------------|-------------------------------------|
//! | `state()`   | O(clone of T)                       |
//! | `set()`     | O(clone of T + S) where S = notified |
//! | `undo()`    | O(clone of T + S)                   |
//! | `memoize()` | O(key build) on hit                 |
//!
//! # Failure Modes
//!
//! - **Panicking callback**: propagates to whoever triggered the
//!   notification; remaining callbacks for that wave are skipped.
//! - **Failed async action**: the error propagates and no mutation
//!   occurs for that dispatch.
//! - **Re-entrant mutation from a callback**: permitted; no borrow is
//!   held while callbacks run, so the nested mutation completes (and
//!   notifies) before the outer wave resumes. A mutation from inside an
//!   effect skips the in-flight effect for the nested wave.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::history::{DEFAULT_MAX_DEPTH, History};
use crate::memo::{DEFAULT_MEMO_CAPACITY, MemoCache, memo_key};
use crate::record::{FieldKey, Record};
use crate::subscribe::{SubscriberRegistry, Subscription};

/// A cleanup closure returned by an effect, run before the effect's next
/// invocation and once more when the effect is removed.
pub type Cleanup = Box<dyn FnOnce()>;

/// Limits for a store's history depth and memo cache capacity.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of retained history snapshots (clamped to >= 1).
    pub max_history: usize,
    /// Maximum number of cached memo entries (clamped to >= 1).
    pub memo_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_DEPTH,
            memo_capacity: DEFAULT_MEMO_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Set the history depth bound.
    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Set the memo cache capacity.
    #[must_use]
    pub fn with_memo_capacity(mut self, memo_capacity: usize) -> Self {
        self.memo_capacity = memo_capacity;
        self
    }
}

/// Shared interior for [`Store<T>`].
struct StoreInner<T: Record> {
    state: T,
    history: History<T>,
    memo: MemoCache,
    /// Monotone mutation counter: bumps on set, batch, undo, and reset.
    version: u64,
}

/// Observable state container over a [`Record`] type.
///
/// Cloning a `Store` creates a new handle to the **same** inner state —
/// both handles see the same snapshots and share subscribers.
///
/// # Invariants
///
/// 1. The newest history entry equals current state after every mutating
///    operation.
/// 2. `state()` hands out clones; callers cannot mutate the interior
///    through the returned value.
/// 3. Subscribers under one field are notified in registration order.
pub struct Store<T: Record> {
    inner: Rc<RefCell<StoreInner<T>>>,
    subscribers: SubscriberRegistry<T>,
}

impl<T: Record> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T: Record> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("history_depth", &inner.history.len())
            .field("subscriber_count", &self.subscribers.subscriber_count())
            .finish()
    }
}

impl<T: Record> Store<T> {
    /// Create a store with default limits. The initial value is cloned in
    /// and seeds the history as its sole entry.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store with explicit limits.
    #[must_use]
    pub fn with_config(initial: T, config: StoreConfig) -> Self {
        let state = initial.clone();
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                history: History::new(initial, config.max_history),
                state,
                memo: MemoCache::new(config.memo_capacity),
                version: 0,
            })),
            subscribers: SubscriberRegistry::new(),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// A clone of the current state.
    #[must_use]
    pub fn state(&self) -> T {
        self.inner.borrow().state.clone()
    }

    /// Access the current state by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().state)
    }

    /// Pure projection over current state. No caching, no side effects.
    pub fn select<K>(&self, selector: impl FnOnce(&T) -> K) -> K {
        selector(&self.inner.borrow().state)
    }

    /// Alias of [`select`](Store::select), kept for API symmetry with
    /// [`memoize`](Store::memoize).
    pub fn compute<K>(&self, compute: impl FnOnce(&T) -> K) -> K {
        self.select(compute)
    }

    /// History snapshots, oldest first. Length never exceeds the
    /// configured bound; the last entry equals [`state()`](Store::state).
    #[must_use]
    pub fn history(&self) -> Vec<T> {
        self.inner.borrow().history.iter().cloned().collect()
    }

    /// Monotone mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Total registered subscriber pairings.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.subscriber_count()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Shallow-merge `patch` onto current state, record the new snapshot
    /// in history (evicting the oldest past the bound), and notify every
    /// callback subscribed under a *supplied* field key.
    ///
    /// Notification is keyed by which fields the patch supplies, not by
    /// whether values actually differ: supplying an unchanged value still
    /// notifies that field's subscribers.
    pub fn set(&self, patch: T::Patch) {
        let keys = T::patch_keys(&patch);
        let (new_state, old_state) = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.state.clone();
            inner.state.merge(&patch);
            let new = inner.state.clone();
            inner.history.record(new.clone());
            inner.version += 1;
            (new, old)
        };
        trace!(keys = ?keys, "state patched");
        self.notify(&keys, &new_state, &old_state);
    }

    /// Fold several patches into a single snapshot: one history entry,
    /// one version bump, one notification wave keyed by the union of
    /// supplied fields in first-seen order. An empty batch is a no-op.
    pub fn set_batch(&self, patches: impl IntoIterator<Item = T::Patch>) {
        let mut keys: Vec<FieldKey> = Vec::new();
        let (new_state, old_state, applied) = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.state.clone();
            let mut applied = 0usize;
            for patch in patches {
                for key in T::patch_keys(&patch) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                inner.state.merge(&patch);
                applied += 1;
            }
            if applied == 0 {
                return;
            }
            let new = inner.state.clone();
            inner.history.record(new.clone());
            inner.version += 1;
            (new, old, applied)
        };
        debug!(patches = applied, keys = ?keys, "batch applied as a single snapshot");
        self.notify(&keys, &new_state, &old_state);
    }

    /// Discard the newest history snapshot and restore the one beneath
    /// it, returning `true`. At the floor (a single retained snapshot)
    /// nothing changes and `false` is returned.
    ///
    /// Subscribers are notified on the fields whose values differ between
    /// the discarded and restored snapshots.
    pub fn undo(&self) -> bool {
        let (new_state, old_state) = {
            let mut inner = self.inner.borrow_mut();
            let Some(restored) = inner.history.undo() else {
                debug!("undo at history floor; nothing to discard");
                return false;
            };
            let old = std::mem::replace(&mut inner.state, restored.clone());
            inner.version += 1;
            (restored, old)
        };
        let keys = old_state.diff_keys(&new_state);
        trace!(keys = ?keys, "state restored from history");
        self.notify(&keys, &new_state, &old_state);
        true
    }

    /// Restore the *oldest retained* history snapshot and truncate the
    /// history to that single entry.
    ///
    /// Once eviction has discarded the construction snapshot, the oldest
    /// retained entry is not the construction value; reset deliberately
    /// restores what is retained, not what was constructed.
    pub fn reset(&self) {
        let (new_state, old_state) = {
            let mut inner = self.inner.borrow_mut();
            let restored = inner.history.reset_to_oldest();
            let old = std::mem::replace(&mut inner.state, restored.clone());
            inner.version += 1;
            (restored, old)
        };
        let keys = old_state.diff_keys(&new_state);
        trace!(keys = ?keys, "state reset to oldest retained snapshot");
        self.notify(&keys, &new_state, &old_state);
    }

    /// Compute a patch from current state, then apply it via
    /// [`set`](Store::set). A panicking action mutates nothing.
    pub fn dispatch(&self, action: impl FnOnce(&T) -> T::Patch) {
        let state = self.state();
        let patch = action(&state);
        self.set(patch);
    }

    /// Await a patch from an async action, then apply it via
    /// [`set`](Store::set). On `Err` the error propagates and no
    /// mutation occurs.
    ///
    /// No borrow is held across the await: other operations may run
    /// against the store while the action is pending, and a mutation that
    /// lands first is simply overwritten where the resolved patch
    /// supplies the same fields (last-applied-wins). There is no
    /// cancellation beyond dropping the future before completion.
    pub async fn dispatch_async<F, Fut, E>(&self, action: F) -> Result<(), E>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T::Patch, E>>,
    {
        let state = self.state();
        let patch = action(state).await?;
        self.set(patch);
        Ok(())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register `callback` under one field key. Invoked with
    /// `(new, old)` snapshots whenever a mutation notifies that field.
    ///
    /// Returns a guard; dropping it (or calling its consuming
    /// `unsubscribe`) removes exactly this pairing. A key that is not a
    /// field of `T` is accepted but inert (and logs a warning).
    pub fn subscribe(
        &self,
        field: FieldKey,
        callback: impl Fn(&T, &T) + 'static,
    ) -> Subscription<T> {
        if !T::is_field(field) {
            warn!(field, "subscribing to a key that is not a field of this record");
        }
        self.subscribers.register(&[field], callback)
    }

    /// Register `callback` under every field of `T`. The returned guard
    /// removes all of the pairings together.
    ///
    /// A multi-field patch invokes the callback once per supplied field.
    pub fn subscribe_all(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription<T> {
        self.subscribers.register(T::FIELDS, callback)
    }

    /// Mount a side effect: on every notified change, the previously
    /// returned cleanup (if any) runs first, then `effect(new_state)`
    /// runs and its returned cleanup is stored.
    ///
    /// The effect is *not* invoked at registration time; it first runs on
    /// the next notified change. The effect may re-enter the store,
    /// mutations included; a wave triggered from inside the effect skips
    /// the in-flight effect rather than recursing into it. Dropping the
    /// returned handle runs the last stored cleanup exactly once, then
    /// unsubscribes.
    pub fn effect(&self, effect: impl FnMut(&T) -> Option<Cleanup> + 'static) -> EffectHandle<T> {
        let effect = Rc::new(RefCell::new(Some(effect)));
        let cleanup: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&cleanup);
        let subscription = self.subscribe_all(move |new_state, _old_state| {
            // Take the effect out of its cell so no borrow is held while
            // it runs. A nested wave finds the cell empty and skips.
            let Some(mut run_effect) = effect.borrow_mut().take() else {
                return;
            };
            let prior = slot.borrow_mut().take();
            if let Some(run) = prior {
                run();
            }
            let next = run_effect(new_state);
            *effect.borrow_mut() = Some(run_effect);
            *slot.borrow_mut() = next;
        });

        EffectHandle {
            cleanup,
            subscription: Some(subscription),
        }
    }

    // ========================================================================
    // Derived reads
    // ========================================================================

    /// Memoized derived read. The cache key is built from `deps` and the
    /// serialized current values of those fields (order-sensitive); on a
    /// hit the cached value is returned without invoking `compute`.
    ///
    /// Old entries are not invalidated when a dependency changes — the
    /// changed value produces a different key — but the cache is a
    /// bounded LRU, so stale combinations age out.
    ///
    /// `compute` runs with no interior borrow held, so it may re-enter
    /// the store (reads included).
    pub fn memoize<K: Clone + 'static>(
        &self,
        compute: impl FnOnce(&T) -> K,
        deps: &[FieldKey],
    ) -> K {
        let key = {
            let inner = self.inner.borrow();
            memo_key(&inner.state, deps)
        };
        if let Some(hit) = self.inner.borrow_mut().memo.lookup::<K>(&key) {
            trace!(%key, "memo hit");
            return hit;
        }
        trace!(%key, "memo miss");
        let state = self.state();
        let value = compute(&state);
        self.inner.borrow_mut().memo.insert(key, &value);
        value
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Invoke, for each key in order, every callback registered under
    /// that key. Callback lists are snapshotted per key before invocation
    /// so callbacks may re-enter the store.
    fn notify(&self, keys: &[FieldKey], new_state: &T, old_state: &T) {
        for &key in keys {
            for callback in self.subscribers.callbacks_for(key) {
                callback(new_state, old_state);
            }
        }
    }
}

/// Guard for a mounted effect.
///
/// Dropping the handle runs the effect's last stored cleanup exactly
/// once, then removes the underlying subscription.
pub struct EffectHandle<T> {
    cleanup: Rc<RefCell<Option<Cleanup>>>,
    subscription: Option<Subscription<T>>,
}

impl<T> EffectHandle<T> {
    /// Tear the effect down now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> fmt::Debug for EffectHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_cleanup", &self.cleanup.borrow().is_some())
            .finish()
    }
}

impl<T> Drop for EffectHandle<T> {
    fn drop(&mut self) {
        if let Some(run) = self.cleanup.borrow_mut().take() {
            run();
        }
        self.subscription.take();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
