#![forbid(unsafe_code)]

//! Field-observable state container with bounded snapshot history,
//! memoized derived reads, and mountable side effects.
//!
//! # Role
//!
//! `snapstore` holds one versioned snapshot of an application-defined
//! record and is its single source of truth: mutations go through the
//! store, subscribers keyed by field name observe `(new, old)` snapshot
//! pairs, and a bounded linear history backs undo and reset.
//!
//! # Primary pieces
//!
//! - [`Store`]: the container — partial updates, subscriptions, undo,
//!   dispatch (sync and async), memoized reads, effects.
//! - [`Record`] / [`record!`]: the record abstraction — a fixed field-key
//!   set with shallow patch merge, generated by a declarative macro.
//! - [`History`]: the bounded snapshot log.
//! - [`Subscription`] / [`EffectHandle`]: RAII guards for subscribers and
//!   mounted effects.
//!
//! # Execution model
//!
//! Single-threaded, cooperative (`Rc<RefCell<..>>` interior). Mutations
//! run to completion synchronously, including their notification wave;
//! the async dispatch is the only suspension point and holds no borrow
//! across its await, so concurrent mutations interleave as
//! last-applied-wins.
//!
//! # Example
//!
//! ```
//! use snapstore::Store;
//!
//! snapstore::record! {
//!     pub struct Counter patch CounterPatch {
//!         count: i64,
//!         label: String,
//!     }
//! }
//!
//! let store = Store::new(Counter { count: 0, label: "ticks".into() });
//!
//! let sub = store.subscribe("count", |new, old| {
//!     println!("{} -> {}", old.count, new.count);
//! });
//!
//! store.dispatch(|s| CounterPatch { count: Some(s.count + 1), ..Default::default() });
//! assert_eq!(store.state().count, 1);
//!
//! assert!(store.undo());
//! assert_eq!(store.state().count, 0);
//!
//! sub.unsubscribe();
//! ```

pub mod history;
mod memo;
pub mod record;
pub mod store;
pub mod subscribe;

pub use history::History;
pub use record::{FieldKey, Record};
pub use store::{Cleanup, EffectHandle, Store, StoreConfig};
pub use subscribe::Subscription;
