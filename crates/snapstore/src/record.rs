#![forbid(unsafe_code)]

//! Record abstraction: static field keys, shallow patch merge, per-field
//! diffs, and field-value fingerprints.
//!
//! # Design
//!
//! A [`Record`] is a plain struct whose fields form a fixed, compile-time
//! key set. Mutations arrive as a *patch*: a companion struct with one
//! `Option` per field, where `Some` means "overwrite this field" and `None`
//! means "leave it alone". The trait exposes just enough introspection for
//! the store to do field-keyed change notification and memoization:
//!
//! - [`Record::FIELDS`] — every key, in declaration order.
//! - [`Record::patch_keys`] — which keys a patch supplies.
//! - [`Record::diff_keys`] — which keys differ between two snapshots.
//! - [`Record::field_token`] — a serialized fingerprint of one field's
//!   current value, used to build memo cache keys.
//!
//! # Invariants
//!
//! 1. `merge` touches exactly the fields for which the patch is `Some`.
//! 2. `patch_keys` and `diff_keys` return keys in declaration order.
//! 3. `field_token` returns `None` only for keys not in `FIELDS`.
//!
//! Hand-implementing the trait is possible but tedious; the [`record!`]
//! macro generates the struct, its patch struct, and the impl in one shot.

use std::fmt;

/// A field name. Keys are static strings produced by `stringify!` in the
/// [`record!`] macro, so comparisons are cheap and no allocation happens
/// on the subscription path.
pub type FieldKey = &'static str;

/// A record type the store can hold: cloneable snapshot, patch-mergeable,
/// field-introspectable.
pub trait Record: Clone + fmt::Debug + PartialEq + 'static {
    /// Partial update: one `Option` per field.
    type Patch: Clone + fmt::Debug;

    /// Every field key, in declaration order.
    const FIELDS: &'static [FieldKey];

    /// Shallow-merge `patch` onto `self`: each supplied field overwrites
    /// the current value, absent fields are untouched.
    fn merge(&mut self, patch: &Self::Patch);

    /// The field keys `patch` supplies, in declaration order.
    fn patch_keys(patch: &Self::Patch) -> Vec<FieldKey>;

    /// The field keys whose values differ between `self` and `other`,
    /// in declaration order.
    fn diff_keys(&self, other: &Self) -> Vec<FieldKey>;

    /// Serialized fingerprint of one field's current value. `None` for
    /// keys that are not fields of this record.
    fn field_token(&self, field: FieldKey) -> Option<String>;

    /// Whether `field` names a field of this record.
    #[must_use]
    fn is_field(field: &str) -> bool {
        Self::FIELDS.contains(&field)
    }
}

#[doc(hidden)]
pub mod __private {
    //! Support items for the [`record!`](crate::record!) macro. Not part
    //! of the public API.

    /// Serialize a field value into its memo-key fingerprint.
    pub fn token<T: serde::Serialize>(value: &T) -> Option<String> {
        serde_json::to_string(value).ok()
    }
}

/// Define a record struct together with its patch struct and [`Record`]
/// impl.
///
/// The caller names both the record and the patch type (macro-by-example
/// cannot concatenate identifiers). Every field must be `Clone + Debug +
/// PartialEq + serde::Serialize`.
///
/// ```
/// snapstore::record! {
///     /// One recording session.
///     pub struct Session patch SessionPatch {
///         count: i64,
///         label: String,
///     }
/// }
///
/// let mut s = Session { count: 0, label: String::new() };
/// s.merge(&SessionPatch { count: Some(3), ..Default::default() });
/// assert_eq!(s.count, 3);
/// # use snapstore::Record;
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$smeta:meta])*
        $vis:vis struct $name:ident patch $patch:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$smeta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
        }

        /// Partial update for the record: `Some` overwrites, `None` skips.
        #[derive(Clone, Debug, Default)]
        $vis struct $patch {
            $( pub $field: ::core::option::Option<$ty>, )+
        }

        impl $crate::Record for $name {
            type Patch = $patch;

            const FIELDS: &'static [$crate::FieldKey] = &[$( stringify!($field) ),+];

            fn merge(&mut self, patch: &$patch) {
                $(
                    if let ::core::option::Option::Some(value) = &patch.$field {
                        self.$field = ::core::clone::Clone::clone(value);
                    }
                )+
            }

            fn patch_keys(patch: &$patch) -> ::std::vec::Vec<$crate::FieldKey> {
                let mut keys = ::std::vec::Vec::new();
                $(
                    if patch.$field.is_some() {
                        keys.push(stringify!($field));
                    }
                )+
                keys
            }

            fn diff_keys(&self, other: &Self) -> ::std::vec::Vec<$crate::FieldKey> {
                let mut keys = ::std::vec::Vec::new();
                $(
                    if self.$field != other.$field {
                        keys.push(stringify!($field));
                    }
                )+
                keys
            }

            fn field_token(
                &self,
                field: $crate::FieldKey,
            ) -> ::core::option::Option<::std::string::String> {
                $(
                    if field == stringify!($field) {
                        return $crate::record::__private::token(&self.$field);
                    }
                )+
                ::core::option::Option::None
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    crate::record! {
        struct Sample patch SamplePatch {
            count: i64,
            label: String,
            flag: bool,
        }
    }

    fn sample() -> Sample {
        Sample {
            count: 0,
            label: String::new(),
            flag: false,
        }
    }

    #[test]
    fn fields_in_declaration_order() {
        assert_eq!(Sample::FIELDS, &["count", "label", "flag"]);
    }

    #[test]
    fn merge_overwrites_supplied_fields_only() {
        let mut s = sample();
        s.merge(&SamplePatch {
            count: Some(7),
            label: Some("hello".to_string()),
            flag: None,
        });
        assert_eq!(s.count, 7);
        assert_eq!(s.label, "hello");
        assert!(!s.flag);
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let mut s = sample();
        let before = s.clone();
        s.merge(&SamplePatch::default());
        assert_eq!(s, before);
    }

    #[test]
    fn patch_keys_reflect_supplied_fields() {
        let patch = SamplePatch {
            count: Some(1),
            label: None,
            flag: Some(true),
        };
        assert_eq!(Sample::patch_keys(&patch), vec!["count", "flag"]);
        assert!(Sample::patch_keys(&SamplePatch::default()).is_empty());
    }

    #[test]
    fn patch_keys_include_supplied_but_equal_values() {
        // A patch that supplies the current value still counts as supplying
        // the key; the store notifies on supplied keys, not value changes.
        let patch = SamplePatch {
            count: Some(0),
            label: None,
            flag: None,
        };
        assert_eq!(Sample::patch_keys(&patch), vec!["count"]);
    }

    #[test]
    fn diff_keys_between_snapshots() {
        let a = sample();
        let mut b = a.clone();
        b.count = 9;
        b.flag = true;
        assert_eq!(a.diff_keys(&b), vec!["count", "flag"]);
        assert!(a.diff_keys(&a.clone()).is_empty());
    }

    #[test]
    fn field_token_serializes_values() {
        let mut s = sample();
        s.count = 3;
        s.label = "abc".to_string();
        assert_eq!(s.field_token("count").as_deref(), Some("3"));
        assert_eq!(s.field_token("label").as_deref(), Some("\"abc\""));
        assert_eq!(s.field_token("flag").as_deref(), Some("false"));
    }

    #[test]
    fn field_token_unknown_key_is_none() {
        assert_eq!(sample().field_token("bogus"), None);
    }

    #[test]
    fn is_field_checks_static_key_set() {
        assert!(Sample::is_field("count"));
        assert!(!Sample::is_field("bogus"));
    }
}
