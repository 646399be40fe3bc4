//! # Page Model
//!
//! A page is the immutable, versioned unit of the tree: either a [`Leaf`]
//! holding sorted (key, value-holder) entries or a [`Node`] holding pivot
//! keys and child references. Pages are shared through `Arc` and never
//! mutated once an operation has returned them — a logical change always
//! produces a new page linked into a new path from a new root, which is what
//! lets any number of readers traverse old revisions while the writer
//! advances the tree.
//!
//! ## Key Slots
//!
//! Keys live in pages behind [`KeySlot`], which defers deserialization until
//! a key is actually compared or returned. Slots created by the in-memory
//! write path start decoded; slots created from raw bytes (the seam a
//! durable collaborator loads pages through) decode lazily on first touch
//! and cache the result.
//!
//! ## Recursion Entry Points
//!
//! [`root_insert`] and [`root_delete`] wrap the recursive page operations
//! with the root-only concerns: growing a new root on a root split and
//! collapsing the root when a merge cascade leaves it with a single child.
//! They are shared verbatim by the outer tree and by the duplicate-key
//! sub-trees, which reuse the whole engine with the value type as key.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use eyre::{bail, eyre, Result};

use super::leaf::Leaf;
use super::node::Node;
use super::result::{DeleteResult, InsertResult, Removal};
use super::tree::TreeConfig;
use crate::serial::{Element, ElementSerializer};
use crate::store::PageRef;

/// Maximum tree depth the cursor path stack holds inline. Deeper trees
/// spill to the heap; with any realistic fan-out, eight levels cover
/// billions of entries.
pub(crate) const MAX_TREE_DEPTH: usize = 8;

/// Lazily-deserialized key wrapper stored in pages.
pub struct KeySlot<K> {
    raw: Option<Box<[u8]>>,
    key: OnceLock<K>,
}

impl<K: Element> KeySlot<K> {
    pub(crate) fn from_key(key: K) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(key);
        Self {
            raw: None,
            key: cell,
        }
    }

    /// Wraps serialized bytes; the key decodes on first access.
    pub(crate) fn from_bytes(raw: Vec<u8>) -> Self {
        Self {
            raw: Some(raw.into_boxed_slice()),
            key: OnceLock::new(),
        }
    }

    /// The decoded key, deserializing and caching it on first touch.
    /// A decode failure here means the stored bytes are corrupt; it
    /// propagates as a fatal error.
    pub(crate) fn key(&self, ser: &dyn ElementSerializer<K>) -> Result<&K> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let Some(raw) = self.raw.as_deref() else {
            bail!("key slot holds neither bytes nor a decoded key");
        };
        let decoded = ser.deserialize(raw)?;
        // Racing readers decode the same bytes; first one wins.
        let _ = self.key.set(decoded);
        self.key
            .get()
            .ok_or_else(|| eyre!("key slot failed to cache its decoded key"))
    }

    /// The serialized form, encoding on demand when the slot was built from
    /// a decoded key.
    pub(crate) fn bytes(&self, ser: &dyn ElementSerializer<K>) -> Result<Vec<u8>> {
        if let Some(raw) = self.raw.as_deref() {
            return Ok(raw.to_vec());
        }
        let key = self
            .key
            .get()
            .ok_or_else(|| eyre!("key slot holds neither bytes nor a decoded key"))?;
        Ok(ser.serialize(key))
    }
}

impl<K: Element> Clone for KeySlot<K> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            key: self.key.clone(),
        }
    }
}

impl<K> std::fmt::Debug for KeySlot<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.key.get().is_some(), &self.raw) {
            (true, _) => write!(f, "KeySlot(decoded)"),
            (false, Some(raw)) => write!(f, "KeySlot({} raw bytes)", raw.len()),
            (false, None) => write!(f, "KeySlot(empty)"),
        }
    }
}

/// Binary-search outcome over a sorted key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchResult {
    Found(usize),
    /// Insertion point keeping the sequence sorted.
    NotFound(usize),
}

/// Binary search through lazily-decoded key slots.
pub(crate) fn search<K: Element>(
    keys: &[KeySlot<K>],
    key: &K,
    ser: &dyn ElementSerializer<K>,
) -> Result<SearchResult> {
    let mut lo = 0usize;
    let mut hi = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match ser.compare(keys[mid].key(ser)?, key) {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return Ok(SearchResult::Found(mid)),
        }
    }
    Ok(SearchResult::NotFound(lo))
}

/// The immutable, versioned unit of the tree.
pub enum Page<K: Element, V: Element> {
    Leaf(Leaf<K, V>),
    Node(Node<K, V>),
}

impl<K: Element, V: Element> Page<K, V> {
    pub(crate) fn id(&self) -> PageRef {
        match self {
            Page::Leaf(leaf) => leaf.id(),
            Page::Node(node) => node.id(),
        }
    }

    pub(crate) fn revision(&self) -> u64 {
        match self {
            Page::Leaf(leaf) => leaf.revision(),
            Page::Node(node) => node.revision(),
        }
    }

    /// Number of keys present in this page.
    pub(crate) fn nb_elems(&self) -> usize {
        match self {
            Page::Leaf(leaf) => leaf.nb_elems(),
            Page::Node(node) => node.nb_elems(),
        }
    }

    pub(crate) fn as_leaf(&self) -> Result<&Leaf<K, V>> {
        match self {
            Page::Leaf(leaf) => Ok(leaf),
            Page::Node(_) => bail!("expected a leaf page, found a node"),
        }
    }

    pub(crate) fn as_node(&self) -> Result<&Node<K, V>> {
        match self {
            Page::Node(node) => Ok(node),
            Page::Leaf(_) => bail!("expected a node page, found a leaf"),
        }
    }

    /// Recursive copy-on-write insert. Precondition: the caller holds the
    /// single-writer right.
    pub(crate) fn insert(
        page: &Arc<Self>,
        revision: u64,
        key: K,
        value: V,
        cfg: &TreeConfig<K, V>,
    ) -> Result<InsertResult<K, V>> {
        match &**page {
            Page::Leaf(_) => Leaf::insert(page, revision, key, value, cfg),
            Page::Node(_) => Node::insert(page, revision, key, value, cfg),
        }
    }

    /// Recursive copy-on-write delete. `value` narrows the removal to one
    /// entry of a duplicate set; `None` removes the whole key. `parent`
    /// gives underflowing pages access to their siblings.
    pub(crate) fn delete(
        page: &Arc<Self>,
        revision: u64,
        key: &K,
        value: Option<&V>,
        parent: Option<(&Node<K, V>, usize)>,
        cfg: &TreeConfig<K, V>,
    ) -> Result<DeleteResult<K, V>> {
        match &**page {
            Page::Leaf(_) => Leaf::delete(page, revision, key, value, parent, cfg),
            Page::Node(_) => Node::delete(page, revision, key, value, parent, cfg),
        }
    }
}

/// Inserts through the root, growing a new root node when the old one
/// splits. Returns the new root and the prior value on an existing-key hit.
/// When nothing changed (equal duplicate), the returned root is the input
/// `Arc` itself.
pub(crate) fn root_insert<K: Element, V: Element>(
    root: &Arc<Page<K, V>>,
    revision: u64,
    key: K,
    value: V,
    cfg: &TreeConfig<K, V>,
) -> Result<(Arc<Page<K, V>>, Option<V>)> {
    match Page::insert(root, revision, key, value, cfg)? {
        InsertResult::Modified { page, existing } => Ok((page, existing)),
        InsertResult::Split { left, right, pivot } => {
            tracing::debug!(revision, "root split, tree height increased");
            let new_root = Node::make(revision, vec![pivot], vec![left, right], cfg);
            Ok((new_root, None))
        }
    }
}

/// Deletes through the root, collapsing it onto its single child when a
/// merge cascade empties it. Returns `None` (and copies nothing) when the
/// key or targeted value is absent.
pub(crate) fn root_delete<K: Element, V: Element>(
    root: &Arc<Page<K, V>>,
    revision: u64,
    key: &K,
    value: Option<&V>,
    cfg: &TreeConfig<K, V>,
) -> Result<Option<(Arc<Page<K, V>>, Removal<K, V>)>> {
    match Page::delete(root, revision, key, value, None, cfg)? {
        DeleteResult::NotFound => Ok(None),
        DeleteResult::Modified { page, removal } => {
            let new_root = match &*page {
                Page::Node(node) if node.nb_elems() == 0 => {
                    tracing::debug!(revision, "root collapsed, tree height decreased");
                    node.child_at(0).clone()
                }
                _ => page,
            };
            Ok(Some((new_root, removal)))
        }
        _ => bail!("the root page reported a sibling operation, but it has no siblings"),
    }
}

/// Smallest key reachable from `root`, or `None` for an empty tree.
pub(crate) fn first_key<K: Element, V: Element>(
    root: &Arc<Page<K, V>>,
    ser: &dyn ElementSerializer<K>,
) -> Result<Option<K>> {
    let mut page = Arc::clone(root);
    loop {
        let next = match &*page {
            Page::Node(node) => node.child_at(0).clone(),
            Page::Leaf(leaf) => {
                if leaf.nb_elems() == 0 {
                    return Ok(None);
                }
                return Ok(Some(leaf.key_at(0).key(ser)?.clone()));
            }
        };
        page = next;
    }
}

/// True when `key` is present under `root`.
pub(crate) fn contains_key<K: Element, V: Element>(
    root: &Arc<Page<K, V>>,
    key: &K,
    ser: &dyn ElementSerializer<K>,
) -> Result<bool> {
    let mut page = Arc::clone(root);
    loop {
        let next = match &*page {
            Page::Node(node) => node.child_at(node.child_pos(key, ser)?).clone(),
            Page::Leaf(leaf) => {
                return Ok(matches!(
                    search(leaf.keys(), key, ser)?,
                    SearchResult::Found(_)
                ));
            }
        };
        page = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::LongSerializer;

    fn slots(keys: &[i64]) -> Vec<KeySlot<i64>> {
        keys.iter().map(|&k| KeySlot::from_key(k)).collect()
    }

    #[test]
    fn test_search_finds_existing_keys() {
        let keys = slots(&[1, 3, 5, 7, 9]);
        let ser = LongSerializer;
        assert_eq!(search(&keys, &5, &ser).unwrap(), SearchResult::Found(2));
        assert_eq!(search(&keys, &1, &ser).unwrap(), SearchResult::Found(0));
        assert_eq!(search(&keys, &9, &ser).unwrap(), SearchResult::Found(4));
    }

    #[test]
    fn test_search_reports_insertion_points() {
        let keys = slots(&[1, 3, 5, 7, 9]);
        let ser = LongSerializer;
        assert_eq!(search(&keys, &0, &ser).unwrap(), SearchResult::NotFound(0));
        assert_eq!(search(&keys, &4, &ser).unwrap(), SearchResult::NotFound(2));
        assert_eq!(
            search(&keys, &10, &ser).unwrap(),
            SearchResult::NotFound(5)
        );
    }

    #[test]
    fn test_key_slot_decodes_lazily_and_caches() {
        let ser = LongSerializer;
        let slot = KeySlot::<i64>::from_bytes(ser.serialize(&42));
        assert_eq!(*slot.key(&ser).unwrap(), 42);
        // Second access hits the cache.
        assert_eq!(*slot.key(&ser).unwrap(), 42);
        assert_eq!(slot.bytes(&ser).unwrap(), ser.serialize(&42));
    }

    #[test]
    fn test_key_slot_surfaces_corrupt_bytes() {
        let ser = LongSerializer;
        let slot = KeySlot::<i64>::from_bytes(vec![1, 2, 3]);
        assert!(slot.key(&ser).is_err());
    }

    #[test]
    fn test_key_slot_serializes_decoded_keys() {
        let ser = LongSerializer;
        let slot = KeySlot::from_key(7i64);
        assert_eq!(slot.bytes(&ser).unwrap(), ser.serialize(&7));
    }
}
