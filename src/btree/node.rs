//! # Node Pages
//!
//! An internal node holds n-1 pivot keys and n child references; `child[i]`
//! covers keys below `pivot[i]`, the last child covers everything from the
//! last pivot up, and an equal key descends right. Nodes fold their
//! children's insert/delete outcomes into fresh copies of themselves, obeying
//! the same copy-on-write discipline as leaves.
//!
//! Node splits promote the median pivot exclusively — it moves to the parent
//! and appears in neither half. Node-level borrowing rotates through the
//! parent: the parent's separator comes down as the underflowed node's
//! boundary key while the sibling's boundary key goes up to replace it, and
//! the sibling's boundary child changes sides. Node merges pull the parent's
//! separator down between the two key sequences.

use std::sync::Arc;

use eyre::{bail, eyre, Result};

use super::page::{search, KeySlot, Page, SearchResult};
use super::result::{DeleteResult, InsertResult, Removal};
use super::tree::TreeConfig;
use crate::serial::{Element, ElementSerializer};
use crate::store::PageRef;

/// Internal page routing searches to its children.
pub struct Node<K: Element, V: Element> {
    id: PageRef,
    revision: u64,
    keys: Vec<KeySlot<K>>,
    children: Vec<Arc<Page<K, V>>>,
}

impl<K: Element, V: Element> Node<K, V> {
    /// Wraps fresh pivot/child vectors in a new page allocated from the
    /// store.
    pub(crate) fn make(
        revision: u64,
        keys: Vec<KeySlot<K>>,
        children: Vec<Arc<Page<K, V>>>,
        cfg: &TreeConfig<K, V>,
    ) -> Arc<Page<K, V>> {
        debug_assert_eq!(keys.len() + 1, children.len());
        Arc::new(Page::Node(Self {
            id: cfg.store.allocate(),
            revision,
            keys,
            children,
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

    pub(crate) fn children_len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn child_at(&self, pos: usize) -> &Arc<Page<K, V>> {
        &self.children[pos]
    }

    /// Index of the child covering `key`. Equal keys descend right, which
    /// matches leaf splits promoting the right half's first key.
    pub(crate) fn child_pos(&self, key: &K, ser: &dyn ElementSerializer<K>) -> Result<usize> {
        match search(&self.keys, key, ser)? {
            SearchResult::Found(pos) => Ok(pos + 1),
            SearchResult::NotFound(pos) => Ok(pos),
        }
    }

    pub(crate) fn insert(
        page: &Arc<Page<K, V>>,
        revision: u64,
        key: K,
        value: V,
        cfg: &TreeConfig<K, V>,
    ) -> Result<InsertResult<K, V>> {
        let node = page.as_node()?;
        let pos = node.child_pos(&key, cfg.key_serializer.as_ref())?;

        match Page::insert(&node.children[pos], revision, key, value, cfg)? {
            InsertResult::Modified {
                page: new_child,
                existing,
            } => {
                // An equal-duplicate hit copies nothing anywhere on the path.
                if Arc::ptr_eq(&new_child, &node.children[pos]) {
                    return Ok(InsertResult::Modified {
                        page: Arc::clone(page),
                        existing,
                    });
                }
                let mut children = node.children.clone();
                children[pos] = new_child;
                Ok(InsertResult::Modified {
                    page: Self::make(revision, node.keys.clone(), children, cfg),
                    existing,
                })
            }
            InsertResult::Split { left, right, pivot } => {
                let mut keys = node.keys.clone();
                let mut children = node.children.clone();
                keys.insert(pos, pivot);
                children[pos] = left;
                children.insert(pos + 1, right);

                if keys.len() <= cfg.page_size {
                    return Ok(InsertResult::Modified {
                        page: Self::make(revision, keys, children, cfg),
                        existing: None,
                    });
                }

                // Overflow: promote the median pivot exclusively.
                let middle = keys.len() / 2;
                let right_keys = keys.split_off(middle + 1);
                let promoted = keys
                    .pop()
                    .ok_or_else(|| eyre!("node split on an empty pivot sequence"))?;
                let right_children = children.split_off(middle + 1);
                Ok(InsertResult::Split {
                    left: Self::make(revision, keys, children, cfg),
                    right: Self::make(revision, right_keys, right_children, cfg),
                    pivot: promoted,
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
        let node = page.as_node()?;
        let pos = node.child_pos(key, cfg.key_serializer.as_ref())?;

        match Page::delete(
            &node.children[pos],
            revision,
            key,
            value,
            Some((node, pos)),
            cfg,
        )? {
            DeleteResult::NotFound => Ok(DeleteResult::NotFound),
            DeleteResult::Modified {
                page: new_child,
                removal,
            } => {
                let mut children = node.children.clone();
                children[pos] = new_child;
                Ok(DeleteResult::Modified {
                    page: Self::make(revision, node.keys.clone(), children, cfg),
                    removal,
                })
            }
            DeleteResult::BorrowedFromLeft {
                page: new_child,
                sibling,
                pivot,
                removal,
            } => {
                let mut keys = node.keys.clone();
                let mut children = node.children.clone();
                keys[pos - 1] = pivot;
                children[pos - 1] = sibling;
                children[pos] = new_child;
                Ok(DeleteResult::Modified {
                    page: Self::make(revision, keys, children, cfg),
                    removal,
                })
            }
            DeleteResult::BorrowedFromRight {
                page: new_child,
                sibling,
                pivot,
                removal,
            } => {
                let mut keys = node.keys.clone();
                let mut children = node.children.clone();
                keys[pos] = pivot;
                children[pos] = new_child;
                children[pos + 1] = sibling;
                Ok(DeleteResult::Modified {
                    page: Self::make(revision, keys, children, cfg),
                    removal,
                })
            }
            DeleteResult::MergedWithLeft {
                page: merged,
                removal,
            } => {
                let mut keys = node.keys.clone();
                let mut children = node.children.clone();
                keys.remove(pos - 1);
                children.remove(pos);
                children[pos - 1] = merged;
                node.rebalance(revision, keys, children, parent, removal, cfg)
            }
            DeleteResult::MergedWithRight {
                page: merged,
                removal,
            } => {
                let mut keys = node.keys.clone();
                let mut children = node.children.clone();
                keys.remove(pos);
                children.remove(pos + 1);
                children[pos] = merged;
                node.rebalance(revision, keys, children, parent, removal, cfg)
            }
        }
    }

    /// Wraps post-merge pivots/children, repairing this node's own
    /// underflow through the parent's siblings. The root node may shrink
    /// freely; the tree collapses it separately when it empties.
    fn rebalance(
        &self,
        revision: u64,
        keys: Vec<KeySlot<K>>,
        children: Vec<Arc<Page<K, V>>>,
        parent: Option<(&Node<K, V>, usize)>,
        removal: Removal<K, V>,
        cfg: &TreeConfig<K, V>,
    ) -> Result<DeleteResult<K, V>> {
        let Some((parent_node, ppos)) = parent else {
            return Ok(DeleteResult::Modified {
                page: Self::make(revision, keys, children, cfg),
                removal,
            });
        };
        if keys.len() >= cfg.half() {
            return Ok(DeleteResult::Modified {
                page: Self::make(revision, keys, children, cfg),
                removal,
            });
        }

        if ppos > 0 {
            let left = parent_node.child_at(ppos - 1).as_node()?;
            if left.nb_elems() > cfg.half() {
                // Rotate: parent separator comes down, the left sibling's
                // last key goes up, its last child changes sides.
                let last = left.nb_elems() - 1;
                let promoted = left.keys[last].clone();
                let mut new_keys = Vec::with_capacity(keys.len() + 1);
                new_keys.push(parent_node.keys[ppos - 1].clone());
                new_keys.extend(keys);
                let mut new_children = Vec::with_capacity(children.len() + 1);
                new_children.push(left.children[last + 1].clone());
                new_children.extend(children);
                let sibling = Self::make(
                    revision,
                    left.keys[..last].to_vec(),
                    left.children[..=last].to_vec(),
                    cfg,
                );
                return Ok(DeleteResult::BorrowedFromLeft {
                    page: Self::make(revision, new_keys, new_children, cfg),
                    sibling,
                    pivot: promoted,
                    removal,
                });
            }
        }

        if ppos + 1 < parent_node.children_len() {
            let right = parent_node.child_at(ppos + 1).as_node()?;
            if right.nb_elems() > cfg.half() {
                let promoted = right.keys[0].clone();
                let mut new_keys = keys;
                let mut new_children = children;
                new_keys.push(parent_node.keys[ppos].clone());
                new_children.push(right.children[0].clone());
                let sibling = Self::make(
                    revision,
                    right.keys[1..].to_vec(),
                    right.children[1..].to_vec(),
                    cfg,
                );
                return Ok(DeleteResult::BorrowedFromRight {
                    page: Self::make(revision, new_keys, new_children, cfg),
                    sibling,
                    pivot: promoted,
                    removal,
                });
            }
        }

        if ppos > 0 {
            let left = parent_node.child_at(ppos - 1).as_node()?;
            let mut new_keys = left.keys.clone();
            let mut new_children = left.children.clone();
            new_keys.push(parent_node.keys[ppos - 1].clone());
            new_keys.extend(keys);
            new_children.extend(children);
            return Ok(DeleteResult::MergedWithLeft {
                page: Self::make(revision, new_keys, new_children, cfg),
                removal,
            });
        }

        if ppos + 1 < parent_node.children_len() {
            let right = parent_node.child_at(ppos + 1).as_node()?;
            let mut new_keys = keys;
            let mut new_children = children;
            new_keys.push(parent_node.keys[ppos].clone());
            new_keys.extend(right.keys.clone());
            new_children.extend(right.children.clone());
            return Ok(DeleteResult::MergedWithRight {
                page: Self::make(revision, new_keys, new_children, cfg),
                removal,
            });
        }

        bail!("underflowed node has no siblings: corrupt parent node")
    }
}
