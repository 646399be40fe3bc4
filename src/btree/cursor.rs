//! # Snapshot Cursors
//!
//! A cursor binds to the root that was current when it was created and walks
//! that snapshot bidirectionally, entirely unaffected by later commits. It
//! keeps an explicit path stack of (page, child-index) frames from the root
//! to the current leaf, so `next`/`prev` are incremental O(log n) walks
//! instead of per-step descents from the root.
//!
//! ## Gaps and Entries
//!
//! Within the current leaf the cursor is either *on* an entry or *in* a gap.
//! Gap `i` sits between entries `i - 1` and `i`: `next` from there lands on
//! entry `i`, `prev` on entry `i - 1`, climbing the stack when either index
//! leaves the leaf. Freshly created cursors sit in a gap, so the first
//! `next` yields the first reachable entry.
//!
//! ## Duplicates
//!
//! When the current entry holds a duplicate sub-tree, a nested cursor over
//! that sub-tree drains its values (forward or backward) before the leaf
//! index moves on. The nested cursor is an ordinary `Cursor<V, ()>` — the
//! sub-trees reuse the whole page engine, so they reuse the cursor too.
//!
//! ## End of Traversal
//!
//! `next` past the last entry and `prev` before the first are signaled
//! errors that leave the cursor where it was; callers guard with
//! [`Cursor::has_next`] / [`Cursor::has_prev`]. The walk itself happens on a
//! clone of the stack and is only installed on success, which is also what
//! makes the lookahead calls side-effect-free.

use std::sync::Arc;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use super::leaf::Leaf;
use super::page::{search, Page, SearchResult, MAX_TREE_DEPTH};
use super::result::Tuple;
use super::tree::TreeConfig;
use super::values::ValueHolder;
use crate::mvcc::RevisionTracker;
use crate::serial::{Element, ElementSerializer};

/// One level of the root-to-leaf path. For node pages `idx` is the child
/// the path descends through; for the leaf at the top of the stack the
/// in-leaf position lives in [`Position`] instead.
struct Frame<K: Element, V: Element> {
    page: Arc<Page<K, V>>,
    idx: usize,
}

impl<K: Element, V: Element> Clone for Frame<K, V> {
    fn clone(&self) -> Self {
        Self {
            page: Arc::clone(&self.page),
            idx: self.idx,
        }
    }
}

type Stack<K, V> = SmallVec<[Frame<K, V>; MAX_TREE_DEPTH]>;

/// In-leaf position: in the gap before entry `i`, or on entry `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Gap(usize),
    Entry(usize),
}

/// Which end of a page run a descent aims for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Lower,
    Upper,
}

/// What the cursor was created relative to; `before_first`/`after_last`
/// reset against this bound, not against the tree's global ends.
pub(crate) enum Bound<K> {
    /// Created over the whole tree.
    Edges,
    /// Created positioned at a key (or its insertion point).
    Key(K),
}

/// Bidirectional iterator over one revision of a tree.
pub struct Cursor<K: Element, V: Element> {
    cfg: TreeConfig<K, V>,
    root: Arc<Page<K, V>>,
    revision: u64,
    bound: Bound<K>,
    stack: Stack<K, V>,
    pos: Position,
    /// Open sub-cursor into the current entry's duplicate set, when the
    /// entry holds one.
    inner: Option<Box<Cursor<V, ()>>>,
    tracker: Option<Arc<RevisionTracker<Arc<Page<K, V>>>>>,
    closed: bool,
}

/// Pushes the path from `page` down to a leaf, following the first (or
/// last) child at every node. Returns the reached leaf's entry count.
fn descend<K: Element, V: Element>(
    stack: &mut Stack<K, V>,
    mut page: Arc<Page<K, V>>,
    edge: Edge,
) -> usize {
    loop {
        if let Page::Node(node) = &*page {
            let idx = match edge {
                Edge::Lower => 0,
                Edge::Upper => node.children_len() - 1,
            };
            let child = Arc::clone(node.child_at(idx));
            stack.push(Frame {
                page: Arc::clone(&page),
                idx,
            });
            page = child;
        } else {
            let len = page.nb_elems();
            stack.push(Frame { page, idx: 0 });
            return len;
        }
    }
}

/// Pushes the path from `page` down to the leaf that would contain `key`,
/// returning where the key sits (or would sit) in that leaf.
fn descend_to_key<K: Element, V: Element>(
    stack: &mut Stack<K, V>,
    mut page: Arc<Page<K, V>>,
    key: &K,
    ser: &dyn ElementSerializer<K>,
) -> Result<SearchResult> {
    loop {
        if let Page::Node(node) = &*page {
            let idx = node.child_pos(key, ser)?;
            let child = Arc::clone(node.child_at(idx));
            stack.push(Frame {
                page: Arc::clone(&page),
                idx,
            });
            page = child;
        } else {
            let hit = search(page.as_leaf()?.keys(), key, ser)?;
            stack.push(Frame { page, idx: 0 });
            return Ok(hit);
        }
    }
}

impl<K: Element, V: Element> Cursor<K, V> {
    /// Opens a cursor over a published snapshot. The caller has already
    /// registered the read with `tracker`; this cursor releases it on close.
    pub(crate) fn over_snapshot(
        cfg: TreeConfig<K, V>,
        root: Arc<Page<K, V>>,
        revision: u64,
        tracker: Arc<RevisionTracker<Arc<Page<K, V>>>>,
        bound: Bound<K>,
    ) -> Result<Self> {
        let mut cursor = Self {
            cfg,
            root,
            revision,
            bound,
            stack: Stack::new(),
            pos: Position::Gap(0),
            inner: None,
            tracker: Some(tracker),
            closed: false,
        };
        cursor.reset(Edge::Lower)?;
        Ok(cursor)
    }

    /// Opens a cursor over a duplicate-value sub-tree, at one of its ends.
    /// Sub-trees live and die with the page that references them, so there
    /// is no revision hold to manage.
    pub(crate) fn over_subtree(
        cfg: TreeConfig<K, V>,
        root: Arc<Page<K, V>>,
        edge: Edge,
    ) -> Result<Self> {
        let revision = root.revision();
        let mut cursor = Self {
            cfg,
            root,
            revision,
            bound: Bound::Edges,
            stack: Stack::new(),
            pos: Position::Gap(0),
            inner: None,
            tracker: None,
            closed: false,
        };
        cursor.reset(edge)?;
        Ok(cursor)
    }

    /// The snapshot revision this cursor observes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Resets to the gap just before the creation bound: the tree's first
    /// entry for a whole-tree cursor, the bound key's position otherwise.
    pub fn before_first(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.reset(Edge::Lower)
    }

    /// Resets to the gap just after the creation bound.
    pub fn after_last(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.reset(Edge::Upper)
    }

    /// True when a `next()` call would succeed. Never moves the cursor.
    pub fn has_next(&self) -> Result<bool> {
        self.ensure_open()?;
        if let Some(inner) = self.inner.as_deref() {
            if inner.has_next()? {
                return Ok(true);
            }
        }
        Ok(self.walk_forward()?.is_some())
    }

    /// True when a `prev()` call would succeed. Never moves the cursor.
    pub fn has_prev(&self) -> Result<bool> {
        self.ensure_open()?;
        if let Some(inner) = self.inner.as_deref() {
            if inner.has_prev()? {
                return Ok(true);
            }
        }
        Ok(self.walk_backward()?.is_some())
    }

    /// Advances to and returns the next tuple. Duplicate values of the
    /// current key drain first, in value order. Fails past the last tuple,
    /// leaving the position unchanged.
    pub fn next(&mut self) -> Result<Tuple<K, V>> {
        self.ensure_open()?;
        if let Some(inner) = self.inner.as_mut() {
            if inner.has_next()? {
                let value = inner.next()?.key;
                let key = self.current_key()?;
                return Ok(Tuple::new(key, value));
            }
        }
        let Some((stack, idx)) = self.walk_forward()? else {
            bail!("no next element: the cursor is past the last tuple");
        };
        self.stack = stack;
        self.pos = Position::Entry(idx);
        self.inner = None;
        self.enter(idx, Edge::Lower)
    }

    /// Steps back to and returns the previous tuple. Entering a duplicate
    /// set from the right yields its largest value first. Fails before the
    /// first tuple, leaving the position unchanged.
    pub fn prev(&mut self) -> Result<Tuple<K, V>> {
        self.ensure_open()?;
        if let Some(inner) = self.inner.as_mut() {
            if inner.has_prev()? {
                let value = inner.prev()?.key;
                let key = self.current_key()?;
                return Ok(Tuple::new(key, value));
            }
        }
        let Some((stack, idx)) = self.walk_backward()? else {
            bail!("no previous element: the cursor is before the first tuple");
        };
        self.stack = stack;
        self.pos = Position::Entry(idx);
        self.inner = None;
        self.enter(idx, Edge::Upper)
    }

    /// Skips the rest of the current duplicate set and lands on the first
    /// value of the next distinct key. Returns `None` when no further key
    /// exists, parking the cursor in the gap after the last entry.
    pub fn move_to_next_non_duplicate_key(&mut self) -> Result<Option<Tuple<K, V>>> {
        self.ensure_open()?;
        match self.walk_forward()? {
            Some((stack, idx)) => {
                self.stack = stack;
                self.pos = Position::Entry(idx);
                self.inner = None;
                self.enter(idx, Edge::Lower).map(Some)
            }
            None => {
                self.inner = None;
                self.pos = Position::Gap(self.leaf()?.nb_elems());
                Ok(None)
            }
        }
    }

    /// Skips back over the current duplicate set and lands on the first
    /// value of the previous distinct key. Returns `None` when no earlier
    /// key exists, parking the cursor in the gap before the first entry.
    pub fn move_to_prev_non_duplicate_key(&mut self) -> Result<Option<Tuple<K, V>>> {
        self.ensure_open()?;
        match self.walk_backward()? {
            Some((stack, idx)) => {
                self.stack = stack;
                self.pos = Position::Entry(idx);
                self.inner = None;
                self.enter(idx, Edge::Lower).map(Some)
            }
            None => {
                self.inner = None;
                self.pos = Position::Gap(0);
                Ok(None)
            }
        }
    }

    /// Releases the revision hold. Idempotent; also performed by `Drop`.
    /// Every other operation fails once the cursor is closed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inner = None;
        if let Some(tracker) = self.tracker.take() {
            if let Some(retired) = tracker.release(self.revision) {
                self.cfg.store.free(retired.id());
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.closed, "cursor is closed");
        Ok(())
    }

    fn leaf(&self) -> Result<&Leaf<K, V>> {
        let Some(frame) = self.stack.last() else {
            bail!("cursor has no current page");
        };
        frame.page.as_leaf()
    }

    fn current_key(&self) -> Result<K> {
        let Position::Entry(idx) = self.pos else {
            bail!("cursor is not positioned on an entry");
        };
        Ok(self
            .leaf()?
            .key_at(idx)
            .key(self.cfg.key_serializer.as_ref())?
            .clone())
    }

    /// Rebuilds the stack and position from the creation bound.
    fn reset(&mut self, edge: Edge) -> Result<()> {
        let mut stack = Stack::new();
        let pos = match &self.bound {
            Bound::Edges => {
                let len = descend(&mut stack, Arc::clone(&self.root), edge);
                match edge {
                    Edge::Lower => Position::Gap(0),
                    Edge::Upper => Position::Gap(len),
                }
            }
            Bound::Key(key) => {
                let hit = descend_to_key(
                    &mut stack,
                    Arc::clone(&self.root),
                    key,
                    self.cfg.key_serializer.as_ref(),
                )?;
                match (hit, edge) {
                    (SearchResult::Found(i), Edge::Lower) => Position::Gap(i),
                    (SearchResult::Found(i), Edge::Upper) => Position::Gap(i + 1),
                    (SearchResult::NotFound(i), _) => Position::Gap(i),
                }
            }
        };
        self.stack = stack;
        self.pos = pos;
        self.inner = None;
        Ok(())
    }

    /// Finds the entry a forward step would land on: the stack (cloned, so
    /// failure changes nothing) and the entry index in its leaf, or `None`
    /// past the last entry.
    fn walk_forward(&self) -> Result<Option<(Stack<K, V>, usize)>> {
        let mut stack = self.stack.clone();
        let target = match self.pos {
            Position::Gap(i) => i,
            Position::Entry(i) => i + 1,
        };
        if target < self.leaf()?.nb_elems() {
            return Ok(Some((stack, target)));
        }
        stack.pop();
        loop {
            let child = {
                let Some(frame) = stack.last_mut() else {
                    return Ok(None);
                };
                let node = frame.page.as_node()?;
                if frame.idx + 1 < node.children_len() {
                    frame.idx += 1;
                    Some(Arc::clone(node.child_at(frame.idx)))
                } else {
                    None
                }
            };
            match child {
                Some(page) => {
                    let len = descend(&mut stack, page, Edge::Lower);
                    if len == 0 {
                        bail!("empty non-root leaf encountered during traversal");
                    }
                    return Ok(Some((stack, 0)));
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    /// Backward counterpart of [`Cursor::walk_forward`].
    fn walk_backward(&self) -> Result<Option<(Stack<K, V>, usize)>> {
        let mut stack = self.stack.clone();
        let target = match self.pos {
            Position::Gap(i) | Position::Entry(i) => i,
        };
        if target > 0 {
            return Ok(Some((stack, target - 1)));
        }
        stack.pop();
        loop {
            let child = {
                let Some(frame) = stack.last_mut() else {
                    return Ok(None);
                };
                if frame.idx > 0 {
                    frame.idx -= 1;
                    let node = frame.page.as_node()?;
                    Some(Arc::clone(node.child_at(frame.idx)))
                } else {
                    None
                }
            };
            match child {
                Some(page) => {
                    let len = descend(&mut stack, page, Edge::Upper);
                    if len == 0 {
                        bail!("empty non-root leaf encountered during traversal");
                    }
                    return Ok(Some((stack, len - 1)));
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    /// Produces the tuple for the entry at `idx` in the current leaf,
    /// opening a sub-cursor when the entry holds a duplicate set. `edge`
    /// says which side the entry was reached from: forward arrivals take the
    /// smallest value, backward arrivals the largest.
    fn enter(&mut self, idx: usize, edge: Edge) -> Result<Tuple<K, V>> {
        let (key, holder) = {
            let leaf = self.leaf()?;
            let key = leaf
                .key_at(idx)
                .key(self.cfg.key_serializer.as_ref())?
                .clone();
            (key, leaf.holder_at(idx).clone())
        };
        match holder {
            ValueHolder::Single(value) => Ok(Tuple::new(key, value)),
            ValueHolder::SubTree(tree) => {
                let mut sub = Cursor::over_subtree(self.cfg.value_tree(), tree.root, edge)?;
                let value = match edge {
                    Edge::Lower => sub.next()?.key,
                    Edge::Upper => sub.prev()?.key,
                };
                self.inner = Some(Box::new(sub));
                Ok(Tuple::new(key, value))
            }
        }
    }
}

impl<K: Element, V: Element> Drop for Cursor<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}
