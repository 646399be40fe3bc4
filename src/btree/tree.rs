//! # Tree API
//!
//! [`BTree`] ties the pieces together: the page engine does the structural
//! work, the [`WriteTransaction`] guard serializes writers, and the
//! [`RevisionTracker`] publishes roots and pins the snapshots open cursors
//! still read.
//!
//! A write runs entirely on private copies: it bases itself on the current
//! root, builds a new path bottom-up, and only then swaps the tracker's
//! current root. Readers either see the old root or the new one, never a
//! half-applied state, and a failed write publishes nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eyre::{ensure, Result};

use super::cursor::{Bound, Cursor};
use super::leaf::Leaf;
use super::page::{self, search, Page, SearchResult};
use super::result::Tuple;
use crate::mvcc::{RevisionTracker, WriteTransaction};
use crate::serial::{Element, ElementSerializer, UnitSerializer};
use crate::store::{MemoryStore, PageStore};

/// Fan-out threshold used when the builder is not told otherwise.
const DEFAULT_PAGE_SIZE: usize = 16;

/// Everything the page engine needs to know about one tree: fan-out,
/// duplicate policy, the serializers, and the page store. Duplicate
/// sub-trees run on a derived config with the value type as key.
pub(crate) struct TreeConfig<K: Element, V: Element> {
    pub(crate) page_size: usize,
    pub(crate) allow_duplicates: bool,
    pub(crate) key_serializer: Arc<dyn ElementSerializer<K>>,
    pub(crate) value_serializer: Arc<dyn ElementSerializer<V>>,
    pub(crate) store: Arc<dyn PageStore>,
}

impl<K: Element, V: Element> Clone for TreeConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            page_size: self.page_size,
            allow_duplicates: self.allow_duplicates,
            key_serializer: Arc::clone(&self.key_serializer),
            value_serializer: Arc::clone(&self.value_serializer),
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: Element, V: Element> TreeConfig<K, V> {
    /// Minimum occupancy for a non-root page.
    pub(crate) fn half(&self) -> usize {
        self.page_size / 2
    }

    /// Config for the duplicate-value sub-trees: same fan-out and store,
    /// keyed by the value type, with zero-byte markers as values.
    pub(crate) fn value_tree(&self) -> TreeConfig<V, ()> {
        TreeConfig {
            page_size: self.page_size,
            allow_duplicates: false,
            key_serializer: Arc::clone(&self.value_serializer),
            value_serializer: Arc::new(UnitSerializer),
            store: Arc::clone(&self.store),
        }
    }
}

/// Configures and creates a [`BTree`].
pub struct BTreeBuilder<K: Element, V: Element> {
    key_serializer: Arc<dyn ElementSerializer<K>>,
    value_serializer: Arc<dyn ElementSerializer<V>>,
    page_size: usize,
    allow_duplicates: bool,
    store: Arc<dyn PageStore>,
}

impl<K: Element, V: Element> BTreeBuilder<K, V> {
    pub fn new(
        key_serializer: Arc<dyn ElementSerializer<K>>,
        value_serializer: Arc<dyn ElementSerializer<V>>,
    ) -> Self {
        Self {
            key_serializer,
            value_serializer,
            page_size: DEFAULT_PAGE_SIZE,
            allow_duplicates: false,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Fan-out threshold: the maximum number of keys a page holds before it
    /// splits. Must be at least 2.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Allows a key to hold several distinct values.
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    /// Replaces the default in-memory page store.
    pub fn page_store(mut self, store: Arc<dyn PageStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Result<BTree<K, V>> {
        ensure!(
            self.page_size >= 2,
            "page size must be at least 2, got {}",
            self.page_size
        );
        let cfg = TreeConfig {
            page_size: self.page_size,
            allow_duplicates: self.allow_duplicates,
            key_serializer: self.key_serializer,
            value_serializer: self.value_serializer,
            store: self.store,
        };
        let root: Arc<Page<K, V>> = Arc::new(Page::Leaf(Leaf::empty(0, &cfg)));
        Ok(BTree {
            cfg,
            txn: WriteTransaction::new(),
            tracker: Arc::new(RevisionTracker::new(0, root)),
            nb_elems: AtomicU64::new(0),
        })
    }
}

/// Copy-on-write B-tree with snapshot-isolated readers and a single writer.
pub struct BTree<K: Element, V: Element> {
    cfg: TreeConfig<K, V>,
    txn: WriteTransaction,
    tracker: Arc<RevisionTracker<Arc<Page<K, V>>>>,
    nb_elems: AtomicU64,
}

impl<K: Element, V: Element> BTree<K, V> {
    /// Inserts a (key, value) pair, blocking while another writer is active.
    ///
    /// Returns the value the key previously held: the replaced value when
    /// duplicates are off, or the equal value already present in a duplicate
    /// set (in which case the tree is untouched and no revision is
    /// published). `None` means the pair is new.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>> {
        self.txn.start();
        match self.insert_inner(key, value) {
            Ok(existing) => {
                self.txn.commit()?;
                Ok(existing)
            }
            Err(err) => {
                self.txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Removes a key with every value it holds. Returns the removed key and
    /// its first value, or `None` (tree untouched) when the key is absent.
    pub fn delete(&self, key: &K) -> Result<Option<Tuple<K, V>>> {
        self.txn.start();
        match self.delete_inner(key, None) {
            Ok(removed) => {
                self.txn.commit()?;
                Ok(removed)
            }
            Err(err) => {
                self.txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Removes one value from a key's duplicate set (the whole entry when it
    /// was the last value). Returns `None` when the key is absent or does
    /// not hold that value.
    pub fn delete_value(&self, key: &K, value: &V) -> Result<Option<Tuple<K, V>>> {
        self.txn.start();
        match self.delete_inner(key, Some(value)) {
            Ok(removed) => {
                self.txn.commit()?;
                Ok(removed)
            }
            Err(err) => {
                self.txn.rollback()?;
                Err(err)
            }
        }
    }

    /// The first (smallest) value held by `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let (_, mut page) = self.tracker.current();
        loop {
            let next = match &*page {
                Page::Node(node) => {
                    let pos = node.child_pos(key, self.cfg.key_serializer.as_ref())?;
                    Arc::clone(node.child_at(pos))
                }
                Page::Leaf(leaf) => {
                    return match search(leaf.keys(), key, self.cfg.key_serializer.as_ref())? {
                        SearchResult::Found(pos) => Ok(Some(
                            leaf.holder_at(pos)
                                .first(self.cfg.value_serializer.as_ref())?,
                        )),
                        SearchResult::NotFound(_) => Ok(None),
                    };
                }
            };
            page = next;
        }
    }

    /// True when `key` is present.
    pub fn has_key(&self, key: &K) -> Result<bool> {
        let (_, root) = self.tracker.current();
        page::contains_key(&root, key, self.cfg.key_serializer.as_ref())
    }

    /// True when `key` holds exactly this `value`.
    pub fn contains(&self, key: &K, value: &V) -> Result<bool> {
        let (_, mut page) = self.tracker.current();
        loop {
            let next = match &*page {
                Page::Node(node) => {
                    let pos = node.child_pos(key, self.cfg.key_serializer.as_ref())?;
                    Arc::clone(node.child_at(pos))
                }
                Page::Leaf(leaf) => {
                    return match search(leaf.keys(), key, self.cfg.key_serializer.as_ref())? {
                        SearchResult::Found(pos) => leaf
                            .holder_at(pos)
                            .contains(value, self.cfg.value_serializer.as_ref()),
                        SearchResult::NotFound(_) => Ok(false),
                    };
                }
            };
            page = next;
        }
    }

    /// Opens a cursor over the current revision, positioned before the first
    /// tuple. The snapshot stays readable until the cursor closes, however
    /// many commits happen meanwhile.
    pub fn browse(&self) -> Result<Cursor<K, V>> {
        self.open_cursor(Bound::Edges)
    }

    /// Opens a cursor over the current revision, positioned just before
    /// `key` (or its insertion point when absent).
    pub fn browse_from(&self, key: K) -> Result<Cursor<K, V>> {
        self.open_cursor(Bound::Key(key))
    }

    /// Number of logical (key, value) pairs, duplicates counted.
    pub fn len(&self) -> u64 {
        self.nb_elems.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The currently published revision.
    pub fn revision(&self) -> u64 {
        self.tracker.current().0
    }

    /// Number of page levels from the root to the leaves.
    pub fn height(&self) -> usize {
        let (_, mut page) = self.tracker.current();
        let mut height = 1;
        loop {
            let next = match &*page {
                Page::Node(node) => Arc::clone(node.child_at(0)),
                Page::Leaf(_) => return height,
            };
            height += 1;
            page = next;
        }
    }

    pub fn page_size(&self) -> usize {
        self.cfg.page_size
    }

    pub fn allows_duplicates(&self) -> bool {
        self.cfg.allow_duplicates
    }

    fn insert_inner(&self, key: K, value: V) -> Result<Option<V>> {
        let (revision, root) = self.tracker.current();
        let next = revision + 1;
        let (new_root, existing) = page::root_insert(&root, next, key, value, &self.cfg)?;
        if Arc::ptr_eq(&new_root, &root) {
            // Equal duplicate: nothing changed, nothing to publish.
            return Ok(existing);
        }
        if existing.is_none() {
            self.nb_elems.fetch_add(1, Ordering::Relaxed);
        }
        self.publish(next, new_root);
        Ok(existing)
    }

    fn delete_inner(&self, key: &K, value: Option<&V>) -> Result<Option<Tuple<K, V>>> {
        let (revision, root) = self.tracker.current();
        let next = revision + 1;
        let Some((new_root, removal)) = page::root_delete(&root, next, key, value, &self.cfg)?
        else {
            return Ok(None);
        };
        self.nb_elems.fetch_sub(removal.count, Ordering::Relaxed);
        self.publish(next, new_root);
        Ok(Some(removal.tuple))
    }

    fn publish(&self, revision: u64, root: Arc<Page<K, V>>) {
        tracing::debug!(revision, "revision published");
        for retired in self.tracker.publish(revision, root) {
            self.cfg.store.free(retired.id());
        }
    }

    fn open_cursor(&self, bound: Bound<K>) -> Result<Cursor<K, V>> {
        let (revision, root) = self.tracker.acquire();
        match Cursor::over_snapshot(
            self.cfg.clone(),
            root,
            revision,
            Arc::clone(&self.tracker),
            bound,
        ) {
            Ok(cursor) => Ok(cursor),
            Err(err) => {
                if let Some(retired) = self.tracker.release(revision) {
                    self.cfg.store.free(retired.id());
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{LongSerializer, StringSerializer};

    fn tree() -> BTree<i64, String> {
        BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
            .page_size(4)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_degenerate_page_size() {
        let result = BTreeBuilder::<i64, String>::new(
            Arc::new(LongSerializer),
            Arc::new(StringSerializer),
        )
        .page_size(1)
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_insert_get_round_trip() {
        let tree = tree();
        assert_eq!(tree.insert(1, "one".into()).unwrap(), None);
        assert_eq!(tree.get(&1).unwrap(), Some("one".into()));
        assert_eq!(tree.get(&2).unwrap(), None);
        assert!(tree.has_key(&1).unwrap());
        assert!(!tree.has_key(&2).unwrap());
    }

    #[test]
    fn test_insert_replaces_and_reports_prior_value() {
        let tree = tree();
        tree.insert(1, "one".into()).unwrap();
        assert_eq!(
            tree.insert(1, "uno".into()).unwrap(),
            Some("one".to_string())
        );
        assert_eq!(tree.get(&1).unwrap(), Some("uno".into()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_len_counts_logical_pairs() {
        let tree = BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
            .page_size(4)
            .allow_duplicates(true)
            .build()
            .unwrap();
        tree.insert(1, "a".into()).unwrap();
        tree.insert(1, "b".into()).unwrap();
        tree.insert(2, "c".into()).unwrap();
        assert_eq!(tree.len(), 3);

        // A whole-key delete removes every duplicate at once.
        let removed = tree.delete(&1).unwrap().unwrap();
        assert_eq!(removed.value, "a");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_height_grows_and_revision_advances() {
        let tree = tree();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.revision(), 0);
        for k in 0..32 {
            tree.insert(k, k.to_string()).unwrap();
        }
        assert!(tree.height() > 1);
        assert_eq!(tree.revision(), 32);
    }

    #[test]
    fn test_absent_key_delete_publishes_nothing() {
        let tree = tree();
        tree.insert(1, "one".into()).unwrap();
        let before = tree.revision();
        assert_eq!(tree.delete(&9).unwrap(), None);
        assert_eq!(tree.revision(), before);
    }

    #[test]
    fn test_equal_duplicate_insert_publishes_nothing() {
        let tree = BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
            .page_size(4)
            .allow_duplicates(true)
            .build()
            .unwrap();
        tree.insert(1, "a".into()).unwrap();
        tree.insert(1, "b".into()).unwrap();
        let before = tree.revision();
        assert_eq!(
            tree.insert(1, "b".into()).unwrap(),
            Some("b".to_string())
        );
        assert_eq!(tree.revision(), before);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_delete_value_narrows_to_one_duplicate() {
        let tree = BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
            .page_size(4)
            .allow_duplicates(true)
            .build()
            .unwrap();
        tree.insert(1, "a".into()).unwrap();
        tree.insert(1, "b".into()).unwrap();

        let removed = tree.delete_value(&1, &"a".to_string()).unwrap().unwrap();
        assert_eq!(removed.value, "a");
        assert!(tree.has_key(&1).unwrap());
        assert!(tree.contains(&1, &"b".to_string()).unwrap());
        assert!(!tree.contains(&1, &"a".to_string()).unwrap());

        assert_eq!(tree.delete_value(&1, &"z".to_string()).unwrap(), None);
    }
}
