//! # Duplicate-Key Value Holders
//!
//! Each leaf entry owns one [`ValueHolder`]: a single inline value, or an
//! independently-rooted ordered sub-tree over the values once a key gains a
//! second distinct value. The sub-tree is the same page engine instantiated
//! with the value type as key and a zero-byte marker as value, including its
//! rebalancing and cursor traversal.
//!
//! Values within a sub-tree are ordered by the value comparator; inserting
//! a value that is already present is rejected as meaningless (each value is
//! stored once). Deletion collapses a one-value sub-tree back to `Single`
//! and the leaf removes the whole entry when the last value goes.

use std::sync::Arc;

use eyre::{bail, Result};

use super::page::{self, Page};
use super::tree::TreeConfig;
use crate::serial::{Element, ElementSerializer};

/// Per-key value storage.
pub(crate) enum ValueHolder<V: Element> {
    /// The common case: a key with exactly one value.
    Single(V),
    /// A key with two or more values, held in a nested tree keyed by value.
    SubTree(ValueTree<V>),
}

/// Root and cardinality of a duplicate-value sub-tree.
pub(crate) struct ValueTree<V: Element> {
    pub(crate) root: Arc<Page<V, ()>>,
    pub(crate) len: u64,
}

impl<V: Element> Clone for ValueHolder<V> {
    fn clone(&self) -> Self {
        match self {
            ValueHolder::Single(v) => ValueHolder::Single(v.clone()),
            ValueHolder::SubTree(tree) => ValueHolder::SubTree(ValueTree {
                root: Arc::clone(&tree.root),
                len: tree.len,
            }),
        }
    }
}

impl<V: Element> ValueHolder<V> {
    /// Number of values held.
    pub(crate) fn len(&self) -> u64 {
        match self {
            ValueHolder::Single(_) => 1,
            ValueHolder::SubTree(tree) => tree.len,
        }
    }

    /// The smallest value held.
    pub(crate) fn first(&self, ser: &dyn ElementSerializer<V>) -> Result<V> {
        match self {
            ValueHolder::Single(v) => Ok(v.clone()),
            ValueHolder::SubTree(tree) => match page::first_key(&tree.root, ser)? {
                Some(v) => Ok(v),
                None => bail!("duplicate sub-tree is empty"),
            },
        }
    }

    /// True when `value` is one of the held values.
    pub(crate) fn contains(&self, value: &V, ser: &dyn ElementSerializer<V>) -> Result<bool> {
        match self {
            ValueHolder::Single(v) => Ok(ser.compare(v, value) == std::cmp::Ordering::Equal),
            ValueHolder::SubTree(tree) => page::contains_key(&tree.root, value, ser),
        }
    }
}

/// Outcome of merging one more value into a holder.
pub(crate) enum MergeOutcome<V: Element> {
    /// The value was already present; nothing was copied.
    Existing(V),
    /// A replacement holder carrying one more value.
    Updated(ValueHolder<V>),
}

/// Merges `value` into `holder` under copy-on-write: a second distinct
/// value promotes `Single` to a sub-tree seeded with both.
pub(crate) fn merge_value<K: Element, V: Element>(
    holder: &ValueHolder<V>,
    revision: u64,
    value: V,
    cfg: &TreeConfig<K, V>,
) -> Result<MergeOutcome<V>> {
    let sub = cfg.value_tree();
    match holder {
        ValueHolder::Single(current) => {
            if sub.key_serializer.compare(current, &value) == std::cmp::Ordering::Equal {
                return Ok(MergeOutcome::Existing(current.clone()));
            }
            let root = Arc::new(Page::Leaf(super::leaf::Leaf::empty(revision, &sub)));
            let (root, _) = page::root_insert(&root, revision, current.clone(), (), &sub)?;
            let (root, _) = page::root_insert(&root, revision, value, (), &sub)?;
            Ok(MergeOutcome::Updated(ValueHolder::SubTree(ValueTree {
                root,
                len: 2,
            })))
        }
        ValueHolder::SubTree(tree) => {
            let (root, existing) = page::root_insert(&tree.root, revision, value.clone(), (), &sub)?;
            if existing.is_some() {
                return Ok(MergeOutcome::Existing(value));
            }
            Ok(MergeOutcome::Updated(ValueHolder::SubTree(ValueTree {
                root,
                len: tree.len + 1,
            })))
        }
    }
}

/// Outcome of removing a value (or every value) from a holder.
pub(crate) enum RemoveOutcome<V: Element> {
    /// The targeted value is not held.
    NotFound,
    /// The whole leaf entry goes away. `first` is the smallest removed
    /// value (the representative reported to the caller), `count` how many
    /// values went with it.
    RemoveEntry { first: V, count: u64 },
    /// A replacement holder with the value removed; the entry stays.
    ReplaceHolder { holder: ValueHolder<V>, removed: V },
}

/// Removes `value` from `holder`, or every value when `value` is `None`.
pub(crate) fn remove_value<K: Element, V: Element>(
    holder: &ValueHolder<V>,
    revision: u64,
    value: Option<&V>,
    cfg: &TreeConfig<K, V>,
) -> Result<RemoveOutcome<V>> {
    let sub = cfg.value_tree();
    let Some(value) = value else {
        return Ok(RemoveOutcome::RemoveEntry {
            first: holder.first(sub.key_serializer.as_ref())?,
            count: holder.len(),
        });
    };

    match holder {
        ValueHolder::Single(current) => {
            if sub.key_serializer.compare(current, value) == std::cmp::Ordering::Equal {
                Ok(RemoveOutcome::RemoveEntry {
                    first: current.clone(),
                    count: 1,
                })
            } else {
                Ok(RemoveOutcome::NotFound)
            }
        }
        ValueHolder::SubTree(tree) => {
            let Some((root, _)) = page::root_delete(&tree.root, revision, value, None, &sub)?
            else {
                return Ok(RemoveOutcome::NotFound);
            };
            let remaining = tree.len - 1;
            if remaining == 0 {
                bail!("duplicate sub-tree shrank below one value without being demoted");
            }
            let holder = if remaining == 1 {
                // Collapse back to the inline representation.
                let last = match page::first_key(&root, sub.key_serializer.as_ref())? {
                    Some(v) => v,
                    None => bail!("duplicate sub-tree is empty after deletion"),
                };
                ValueHolder::Single(last)
            } else {
                ValueHolder::SubTree(ValueTree {
                    root,
                    len: remaining,
                })
            };
            Ok(RemoveOutcome::ReplaceHolder {
                holder,
                removed: value.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{LongSerializer, StringSerializer, UnitSerializer};
    use crate::store::MemoryStore;

    fn cfg() -> TreeConfig<i64, String> {
        TreeConfig {
            page_size: 4,
            allow_duplicates: true,
            key_serializer: Arc::new(LongSerializer),
            value_serializer: Arc::new(StringSerializer),
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn values_of(holder: &ValueHolder<String>, cfg: &TreeConfig<i64, String>) -> Vec<String> {
        match holder {
            ValueHolder::Single(v) => vec![v.clone()],
            ValueHolder::SubTree(tree) => {
                let sub = cfg.value_tree();
                let mut cursor = crate::btree::cursor::Cursor::over_subtree(
                    sub,
                    Arc::clone(&tree.root),
                    crate::btree::cursor::Edge::Lower,
                )
                .unwrap();
                let mut out = Vec::new();
                while cursor.has_next().unwrap() {
                    out.push(cursor.next().unwrap().key);
                }
                out
            }
        }
    }

    #[test]
    fn test_second_value_promotes_to_sub_tree() {
        let cfg = cfg();
        let holder = ValueHolder::Single("b".to_string());
        let MergeOutcome::Updated(holder) = merge_value(&holder, 1, "a".to_string(), &cfg).unwrap()
        else {
            panic!("expected promotion");
        };
        assert!(matches!(holder, ValueHolder::SubTree(_)));
        assert_eq!(holder.len(), 2);
        assert_eq!(values_of(&holder, &cfg), ["a", "b"]);
    }

    #[test]
    fn test_equal_value_is_rejected() {
        let cfg = cfg();
        let holder = ValueHolder::Single("a".to_string());
        let MergeOutcome::Existing(prev) = merge_value(&holder, 1, "a".to_string(), &cfg).unwrap()
        else {
            panic!("expected an existing-value hit");
        };
        assert_eq!(prev, "a");

        let MergeOutcome::Updated(holder) = merge_value(&holder, 1, "b".to_string(), &cfg).unwrap()
        else {
            panic!("expected promotion");
        };
        assert!(matches!(
            merge_value(&holder, 2, "b".to_string(), &cfg).unwrap(),
            MergeOutcome::Existing(_)
        ));
    }

    #[test]
    fn test_sub_tree_values_stay_ordered() {
        let cfg = cfg();
        let mut holder = ValueHolder::Single("3".to_string());
        for v in ["1", "4", "2", "5"] {
            let MergeOutcome::Updated(next) =
                merge_value(&holder, 1, v.to_string(), &cfg).unwrap()
            else {
                panic!("expected a new value");
            };
            holder = next;
        }
        assert_eq!(holder.len(), 5);
        assert_eq!(values_of(&holder, &cfg), ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_removal_collapses_back_to_single() {
        let cfg = cfg();
        let holder = ValueHolder::Single("a".to_string());
        let MergeOutcome::Updated(holder) = merge_value(&holder, 1, "b".to_string(), &cfg).unwrap()
        else {
            panic!("expected promotion");
        };

        let RemoveOutcome::ReplaceHolder { holder, removed } =
            remove_value(&holder, 2, Some(&"a".to_string()), &cfg).unwrap()
        else {
            panic!("expected a surviving entry");
        };
        assert_eq!(removed, "a");
        assert!(matches!(&holder, ValueHolder::Single(v) if v == "b"));

        let RemoveOutcome::RemoveEntry { first, count } =
            remove_value(&holder, 3, Some(&"b".to_string()), &cfg).unwrap()
        else {
            panic!("expected entry removal");
        };
        assert_eq!(first, "b");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_whole_entry_removal_reports_cardinality() {
        let cfg = cfg();
        let mut holder = ValueHolder::Single("a".to_string());
        for v in ["b", "c"] {
            let MergeOutcome::Updated(next) =
                merge_value(&holder, 1, v.to_string(), &cfg).unwrap()
            else {
                panic!("expected a new value");
            };
            holder = next;
        }
        let RemoveOutcome::RemoveEntry { first, count } =
            remove_value(&holder, 2, None, &cfg).unwrap()
        else {
            panic!("expected entry removal");
        };
        assert_eq!(first, "a");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_absent_value_short_circuits() {
        let cfg = cfg();
        let holder = ValueHolder::Single("a".to_string());
        assert!(matches!(
            remove_value(&holder, 1, Some(&"z".to_string()), &cfg).unwrap(),
            RemoveOutcome::NotFound
        ));
    }

    #[test]
    fn test_unit_serializer_backs_sub_tree_values() {
        // The sub-tree stores () markers; its config must be buildable.
        let cfg = cfg();
        let sub = cfg.value_tree();
        assert!(!sub.allow_duplicates);
        assert!(UnitSerializer.serialize(&()).is_empty());
        assert_eq!(sub.page_size, cfg.page_size);
    }
}
