//! Operation result types.
//!
//! Insert and delete recurse from the root to a leaf and communicate
//! structural outcomes back up as sibling variants of one enum per
//! operation, so a parent folds its child's outcome with a single `match`:
//!
//! - insert: the child was merely copied ([`InsertResult::Modified`]) or it
//!   overflowed and split ([`InsertResult::Split`]), handing the parent a
//!   promoted pivot to absorb.
//! - delete: the child was copied, repaired an underflow by borrowing a
//!   boundary element from a sibling (the parent must rewrite one pivot), or
//!   merged with a sibling (the parent loses one pivot and one child, and may
//!   underflow in turn).

use std::sync::Arc;

use super::page::{KeySlot, Page};
use crate::serial::Element;

/// A (key, value) pair returned by cursors and delete. No identity beyond
/// its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Tuple<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// What a delete removed: the tuple handed back to the caller plus the
/// number of logical (key, value) pairs that went with it (a whole-key
/// delete of a duplicate set removes several).
pub(crate) struct Removal<K, V> {
    pub(crate) tuple: Tuple<K, V>,
    pub(crate) count: u64,
}

/// Outcome of a recursive insert, propagated parent-ward.
pub(crate) enum InsertResult<K: Element, V: Element> {
    /// A fresh copy of the page with the element applied. `existing` carries
    /// the prior value when the key was already present (value replaced, or
    /// an equal duplicate was a no-op).
    Modified {
        page: Arc<Page<K, V>>,
        existing: Option<V>,
    },
    /// The page overflowed and split at its median. The parent inserts
    /// `pivot` and replaces one child reference with two. A split always
    /// stems from a new element, so there is no prior value to carry.
    Split {
        left: Arc<Page<K, V>>,
        right: Arc<Page<K, V>>,
        pivot: KeySlot<K>,
    },
}

/// Outcome of a recursive delete, propagated parent-ward.
pub(crate) enum DeleteResult<K: Element, V: Element> {
    /// The key (or the targeted value) is absent. No page was copied.
    NotFound,
    /// A fresh copy of the page with the element removed; occupancy is fine.
    Modified {
        page: Arc<Page<K, V>>,
        removal: Removal<K, V>,
    },
    /// Underflow repaired by taking the left sibling's last element.
    /// `pivot` is the parent's replacement separator at `pos - 1`.
    BorrowedFromLeft {
        page: Arc<Page<K, V>>,
        sibling: Arc<Page<K, V>>,
        pivot: KeySlot<K>,
        removal: Removal<K, V>,
    },
    /// Underflow repaired by taking the right sibling's first element.
    /// `pivot` is the parent's replacement separator at `pos`.
    BorrowedFromRight {
        page: Arc<Page<K, V>>,
        sibling: Arc<Page<K, V>>,
        pivot: KeySlot<K>,
        removal: Removal<K, V>,
    },
    /// The page merged into its left sibling; the parent drops the separator
    /// at `pos - 1` and both old children, keeping `page` in their place.
    MergedWithLeft {
        page: Arc<Page<K, V>>,
        removal: Removal<K, V>,
    },
    /// The page absorbed its right sibling; the parent drops the separator
    /// at `pos` and both old children, keeping `page` in their place.
    MergedWithRight {
        page: Arc<Page<K, V>>,
        removal: Removal<K, V>,
    },
}
