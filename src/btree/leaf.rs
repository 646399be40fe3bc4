//! # Leaf Pages
//!
//! A leaf holds sorted (key, [`ValueHolder`]) entries; duplicates of one key
//! live inside a single holder, never as repeated leaf slots, so a leaf entry
//! stays O(1)-sized regardless of duplicate count.
//!
//! ## Copy-on-Write Discipline
//!
//! `insert` and `delete` never touch the receiving page. They build a fresh
//! entry vector, wrap it in a new page with the write's revision, and report
//! the outcome upward. The single exception that copies nothing at all:
//! inserting a value that is already present in a duplicate set, and deleting
//! a key that is absent — both short-circuit without allocation.
//!
//! ## Split / Underflow
//!
//! A leaf exceeding the fan-out threshold splits so the right half receives
//! the median and everything above it; the promoted pivot equals the right
//! half's first key, which keeps both halves within [threshold/2, threshold].
//! A leaf dropping below threshold/2 (when it has a parent) borrows from the
//! left sibling, else the right, else merges — left-merge preferred.

use std::sync::Arc;

use eyre::{bail, Result};

use super::node::Node;
use super::page::{search, KeySlot, Page, SearchResult};
use super::result::{DeleteResult, InsertResult, Removal, Tuple};
use super::tree::TreeConfig;
use super::values::{self, MergeOutcome, RemoveOutcome, ValueHolder};
use crate::serial::Element;
use crate::store::PageRef;

/// Terminal page holding the tree's entries.
pub struct Leaf<K: Element, V: Element> {
    id: PageRef,
    revision: u64,
    keys: Vec<KeySlot<K>>,
    values: Vec<ValueHolder<V>>,
}

impl<K: Element, V: Element> Leaf<K, V> {
    pub(crate) fn empty(revision: u64, cfg: &TreeConfig<K, V>) -> Self {
        Self {
            id: cfg.store.allocate(),
            revision,
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Wraps fresh entry vectors in a new page allocated from the store.
    pub(crate) fn make(
        revision: u64,
        keys: Vec<KeySlot<K>>,
        values: Vec<ValueHolder<V>>,
        cfg: &TreeConfig<K, V>,
    ) -> Arc<Page<K, V>> {
        debug_assert_eq!(keys.len(), values.len());
        Arc::new(Page::Leaf(Self {
            id: cfg.store.allocate(),
            revision,
            keys,
            values,
        }))
    }

    pub(crate) fn id(&self) -> PageRef {
        self.id
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn nb_elems(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn keys(&self) -> &[KeySlot<K>] {
        &self.keys
    }

    pub(crate) fn key_at(&self, pos: usize) -> &KeySlot<K> {
        &self.keys[pos]
    }

    pub(crate) fn holder_at(&self, pos: usize) -> &ValueHolder<V> {
        &self.values[pos]
    }

    pub(crate) fn insert(
        page: &Arc<Page<K, V>>,
        revision: u64,
        key: K,
        value: V,
        cfg: &TreeConfig<K, V>,
    ) -> Result<InsertResult<K, V>> {
        let leaf = page.as_leaf()?;
        match search(&leaf.keys, &key, cfg.key_serializer.as_ref())? {
            SearchResult::Found(pos) => {
                if cfg.allow_duplicates {
                    match values::merge_value(&leaf.values[pos], revision, value, cfg)? {
                        // Equal value already present: nothing to copy.
                        MergeOutcome::Existing(prev) => Ok(InsertResult::Modified {
                            page: Arc::clone(page),
                            existing: Some(prev),
                        }),
                        MergeOutcome::Updated(holder) => {
                            let mut values = leaf.values.clone();
                            values[pos] = holder;
                            Ok(InsertResult::Modified {
                                page: Self::make(revision, leaf.keys.clone(), values, cfg),
                                existing: None,
                            })
                        }
                    }
                } else {
                    let prev = match &leaf.values[pos] {
                        ValueHolder::Single(v) => v.clone(),
                        ValueHolder::SubTree(_) => {
                            bail!("duplicate sub-tree found in a tree that disallows duplicates")
                        }
                    };
                    let mut values = leaf.values.clone();
                    values[pos] = ValueHolder::Single(value);
                    Ok(InsertResult::Modified {
                        page: Self::make(revision, leaf.keys.clone(), values, cfg),
                        existing: Some(prev),
                    })
                }
            }
            SearchResult::NotFound(pos) => {
                let mut keys = leaf.keys.clone();
                let mut values = leaf.values.clone();
                keys.insert(pos, KeySlot::from_key(key));
                values.insert(pos, ValueHolder::Single(value));

                if keys.len() <= cfg.page_size {
                    return Ok(InsertResult::Modified {
                        page: Self::make(revision, keys, values, cfg),
                        existing: None,
                    });
                }

                // Overflow: the right half takes the median and everything
                // above it; the pivot is the right half's first key.
                let middle = keys.len() / 2;
                let right_keys = keys.split_off(middle);
                let right_values = values.split_off(middle);
                let pivot = right_keys[0].clone();
                Ok(InsertResult::Split {
                    left: Self::make(revision, keys, values, cfg),
                    right: Self::make(revision, right_keys, right_values, cfg),
                    pivot,
                })
            }
        }
    }

    pub(crate) fn delete(
        page: &Arc<Page<K, V>>,
        revision: u64,
        key: &K,
        value: Option<&V>,
        parent: Option<(&Node<K, V>, usize)>,
        cfg: &TreeConfig<K, V>,
    ) -> Result<DeleteResult<K, V>> {
        let leaf = page.as_leaf()?;
        let pos = match search(&leaf.keys, key, cfg.key_serializer.as_ref())? {
            SearchResult::Found(pos) => pos,
            SearchResult::NotFound(_) => return Ok(DeleteResult::NotFound),
        };

        match values::remove_value(&leaf.values[pos], revision, value, cfg)? {
            RemoveOutcome::NotFound => Ok(DeleteResult::NotFound),
            RemoveOutcome::ReplaceHolder { holder, removed } => {
                // A value left the duplicate set but the entry stays, so
                // occupancy is unchanged.
                let mut values = leaf.values.clone();
                values[pos] = holder;
                Ok(DeleteResult::Modified {
                    page: Self::make(revision, leaf.keys.clone(), values, cfg),
                    removal: Removal {
                        tuple: Tuple::new(key.clone(), removed),
                        count: 1,
                    },
                })
            }
            RemoveOutcome::RemoveEntry { first, count } => {
                let mut keys = leaf.keys.clone();
                let mut values = leaf.values.clone();
                keys.remove(pos);
                values.remove(pos);
                let removal = Removal {
                    tuple: Tuple::new(key.clone(), first),
                    count,
                };
                Self::rebalance(revision, keys, values, parent, removal, cfg)
            }
        }
    }

    /// Wraps the post-removal entries, repairing underflow through the
    /// parent's siblings when needed. The root leaf may shrink freely.
    fn rebalance(
        revision: u64,
        keys: Vec<KeySlot<K>>,
        values: Vec<ValueHolder<V>>,
        parent: Option<(&Node<K, V>, usize)>,
        removal: Removal<K, V>,
        cfg: &TreeConfig<K, V>,
    ) -> Result<DeleteResult<K, V>> {
        let Some((parent_node, ppos)) = parent else {
            return Ok(DeleteResult::Modified {
                page: Self::make(revision, keys, values, cfg),
                removal,
            });
        };
        if keys.len() >= cfg.half() {
            return Ok(DeleteResult::Modified {
                page: Self::make(revision, keys, values, cfg),
                removal,
            });
        }

        let left = if ppos > 0 {
            Some(parent_node.child_at(ppos - 1).as_leaf()?)
        } else {
            None
        };
        let right = if ppos + 1 < parent_node.children_len() {
            Some(parent_node.child_at(ppos + 1).as_leaf()?)
        } else {
            None
        };

        if let Some(left) = left {
            if left.nb_elems() > cfg.half() {
                let last = left.nb_elems() - 1;
                let borrowed_key = left.keys[last].clone();
                let mut new_keys = Vec::with_capacity(keys.len() + 1);
                new_keys.push(borrowed_key.clone());
                new_keys.extend(keys);
                let mut new_values = Vec::with_capacity(values.len() + 1);
                new_values.push(left.values[last].clone());
                new_values.extend(values);
                let sibling = Self::make(
                    revision,
                    left.keys[..last].to_vec(),
                    left.values[..last].to_vec(),
                    cfg,
                );
                return Ok(DeleteResult::BorrowedFromLeft {
                    page: Self::make(revision, new_keys, new_values, cfg),
                    sibling,
                    pivot: borrowed_key,
                    removal,
                });
            }
        }

        if let Some(right) = right {
            if right.nb_elems() > cfg.half() {
                let mut new_keys = keys;
                let mut new_values = values;
                new_keys.push(right.keys[0].clone());
                new_values.push(right.values[0].clone());
                // The parent's separator becomes the right sibling's new
                // first key.
                let pivot = right.keys[1].clone();
                let sibling = Self::make(
                    revision,
                    right.keys[1..].to_vec(),
                    right.values[1..].to_vec(),
                    cfg,
                );
                return Ok(DeleteResult::BorrowedFromRight {
                    page: Self::make(revision, new_keys, new_values, cfg),
                    sibling,
                    pivot,
                    removal,
                });
            }
        }

        if let Some(left) = left {
            let mut new_keys = left.keys.clone();
            let mut new_values = left.values.clone();
            new_keys.extend(keys);
            new_values.extend(values);
            return Ok(DeleteResult::MergedWithLeft {
                page: Self::make(revision, new_keys, new_values, cfg),
                removal,
            });
        }

        if let Some(right) = right {
            let mut new_keys = keys;
            let mut new_values = values;
            new_keys.extend(right.keys.clone());
            new_values.extend(right.values.clone());
            return Ok(DeleteResult::MergedWithRight {
                page: Self::make(revision, new_keys, new_values, cfg),
                removal,
            });
        }

        bail!("underflowed leaf has no siblings: corrupt parent node")
    }
}
