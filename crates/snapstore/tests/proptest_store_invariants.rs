//! Property-based invariant tests for the state store.
//!
//! These tests drive a [`Store`] with arbitrary operation sequences and
//! check it against a reference model built from a plain `Vec` of
//! snapshots. Invariants that must hold for any valid inputs:
//!
//! 1. The newest history entry always equals current state.
//! 2. History length never exceeds the configured bound.
//! 3. Merge semantics: supplied fields overwrite, absent fields persist.
//! 4. Undo returns `true` exactly when more than one snapshot is retained,
//!    and restores the snapshot beneath the discarded one.
//! 5. Reset restores the oldest retained snapshot and truncates history.
//! 6. A batch folds to a single snapshot, identical to applying its
//!    patches in order.
//! 7. Subscribers keyed on a field are notified once per set supplying
//!    that field, regardless of value changes.
//! 8. Memoized reads always agree with direct selection.
//! 9. No operation sequence panics.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use snapstore::{Record, Store, StoreConfig};

snapstore::record! {
    pub struct Session patch SessionPatch {
        count: i64,
        label: String,
        flag: bool,
    }
}

fn initial() -> Session {
    Session {
        count: 0,
        label: String::new(),
        flag: false,
    }
}

// ── Strategies ────────────────────────────────────────────────────────────

fn patch_strategy() -> impl Strategy<Value = SessionPatch> {
    (
        proptest::option::of(-1000i64..=1000),
        proptest::option::of("[a-z]{0,6}"),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(count, label, flag)| SessionPatch { count, label, flag })
}

#[derive(Debug, Clone)]
enum Op {
    Set(SessionPatch),
    Batch(Vec<SessionPatch>),
    Undo,
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => patch_strategy().prop_map(Op::Set),
        2 => proptest::collection::vec(patch_strategy(), 0..4).prop_map(Op::Batch),
        2 => Just(Op::Undo),
        1 => Just(Op::Reset),
    ]
}

fn op_sequence(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 0..=max_len)
}

// ── Reference model ───────────────────────────────────────────────────────

/// Plain-`Vec` reference for the store's history semantics.
struct Model {
    history: Vec<Session>,
    max_depth: usize,
}

impl Model {
    fn new(initial: Session, max_depth: usize) -> Self {
        Self {
            history: vec![initial],
            max_depth: max_depth.max(1),
        }
    }

    fn state(&self) -> &Session {
        self.history.last().expect("model history is never empty")
    }

    fn push(&mut self, snapshot: Session) {
        self.history.push(snapshot);
        while self.history.len() > self.max_depth {
            self.history.remove(0);
        }
    }

    fn set(&mut self, patch: &SessionPatch) {
        let mut next = self.state().clone();
        next.merge(patch);
        self.push(next);
    }

    fn batch(&mut self, patches: &[SessionPatch]) {
        if patches.is_empty() {
            return;
        }
        let mut next = self.state().clone();
        for patch in patches {
            next.merge(patch);
        }
        self.push(next);
    }

    fn undo(&mut self) -> bool {
        if self.history.len() > 1 {
            self.history.pop();
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        let oldest = self
            .history
            .first()
            .expect("model history is never empty")
            .clone();
        self.history = vec![oldest];
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    /// Invariants 1-6, 9: arbitrary operation sequences agree with the
    /// reference model step by step, at arbitrary history bounds.
    #[test]
    fn store_agrees_with_reference_model(
        ops in op_sequence(40),
        max_depth in 1usize..=8,
    ) {
        let config = StoreConfig::default().with_max_history(max_depth);
        let store = Store::with_config(initial(), config);
        let mut model = Model::new(initial(), max_depth);

        for op in &ops {
            match op {
                Op::Set(patch) => {
                    store.set(patch.clone());
                    model.set(patch);
                }
                Op::Batch(patches) => {
                    store.set_batch(patches.clone());
                    model.batch(patches);
                }
                Op::Undo => {
                    prop_assert_eq!(store.undo(), model.undo());
                }
                Op::Reset => {
                    store.reset();
                    model.reset();
                }
            }

            prop_assert_eq!(store.state(), model.state().clone());
            prop_assert_eq!(store.history(), model.history.clone());
            prop_assert!(store.history().len() <= max_depth);
        }
    }

    /// Invariant 2 at the default bound: long patch runs stay within 50
    /// snapshots and the newest entry mirrors current state.
    #[test]
    fn default_bound_holds_for_long_runs(patches in proptest::collection::vec(patch_strategy(), 0..120)) {
        let store = Store::new(initial());
        for patch in patches {
            store.set(patch);
        }
        let history = store.history();
        prop_assert!(history.len() <= 50);
        prop_assert_eq!(history.last().unwrap().clone(), store.state());
    }

    /// Invariant 3: one set equals a by-hand shallow merge.
    #[test]
    fn set_is_a_shallow_merge(before in patch_strategy(), patch in patch_strategy()) {
        let store = Store::new(initial());
        store.set(before);

        let mut expected = store.state();
        expected.merge(&patch);

        store.set(patch);
        prop_assert_eq!(store.state(), expected);
    }

    /// Invariant 7: a field subscriber fires once per set supplying its
    /// field, never for sets that omit it.
    #[test]
    fn notification_counts_supplied_keys(patches in proptest::collection::vec(patch_strategy(), 0..30)) {
        let store = Store::new(initial());
        let calls = Rc::new(Cell::new(0usize));

        let c = Rc::clone(&calls);
        let _sub = store.subscribe("count", move |_, _| c.set(c.get() + 1));

        let expected = patches.iter().filter(|p| p.count.is_some()).count();
        for patch in patches {
            store.set(patch);
        }
        prop_assert_eq!(calls.get(), expected);
    }

    /// Invariant 8: memoized reads agree with direct selection across
    /// arbitrary mutation sequences.
    #[test]
    fn memoize_agrees_with_select(patches in proptest::collection::vec(patch_strategy(), 0..30)) {
        let store = Store::new(initial());
        for patch in patches {
            store.set(patch);
            let direct = store.select(|s| s.count * 3);
            let memoized = store.memoize(|s| s.count * 3, &["count"]);
            prop_assert_eq!(memoized, direct);
        }
    }

    /// Memoization never recomputes more often than the number of
    /// distinct dependency values it has seen (given enough capacity).
    #[test]
    fn memoize_recomputes_at_most_once_per_distinct_value(
        counts in proptest::collection::vec(-20i64..=20, 1..40),
    ) {
        let config = StoreConfig::default().with_memo_capacity(1024);
        let store = Store::with_config(initial(), config);
        let invocations = Rc::new(Cell::new(0usize));

        let mut distinct: Vec<i64> = vec![0];
        for count in counts {
            store.set(SessionPatch { count: Some(count), ..Default::default() });
            if !distinct.contains(&count) {
                distinct.push(count);
            }

            let inv = Rc::clone(&invocations);
            let _ = store.memoize(
                move |s| {
                    inv.set(inv.get() + 1);
                    s.count
                },
                &["count"],
            );
        }
        prop_assert!(invocations.get() <= distinct.len());
    }
}
