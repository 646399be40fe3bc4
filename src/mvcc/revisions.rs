//! # Revision Tracker
//!
//! Bookkeeping for the snapshots a tree has published. Each committed write
//! produces a new revision whose root is recorded here; cursors acquire a
//! hold on the revision current at their creation and release it on close.
//!
//! A revision is retired — its root reported back to the caller for advisory
//! reclamation — once it is no longer current and no reader holds it. The
//! current revision is always retained, held or not.
//!
//! The tracker is intentionally type-agnostic: it stores an opaque root
//! handle (`T`, in practice an `Arc` to the root page) and never inspects it.

use hashbrown::HashMap;
use parking_lot::Mutex;

struct Hold<T> {
    root: T,
    readers: usize,
}

struct Inner<T> {
    current: u64,
    holds: HashMap<u64, Hold<T>>,
}

/// Tracks published roots and the readers pinning them.
pub(crate) struct RevisionTracker<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> RevisionTracker<T> {
    pub(crate) fn new(revision: u64, root: T) -> Self {
        let mut holds = HashMap::new();
        holds.insert(revision, Hold { root, readers: 0 });
        Self {
            inner: Mutex::new(Inner {
                current: revision,
                holds,
            }),
        }
    }

    /// Current revision and root, without taking a reader hold. Used by
    /// point lookups and by the writer to base the next revision on.
    pub(crate) fn current(&self) -> (u64, T) {
        let inner = self.inner.lock();
        let hold = &inner.holds[&inner.current];
        (inner.current, hold.root.clone())
    }

    /// Current revision and root with a reader hold taken; the caller must
    /// pair this with [`release`](Self::release).
    pub(crate) fn acquire(&self) -> (u64, T) {
        let mut inner = self.inner.lock();
        let current = inner.current;
        let hold = inner
            .holds
            .get_mut(&current)
            .expect("current revision is always held");
        hold.readers += 1;
        (current, hold.root.clone())
    }

    /// Drops one reader hold. Returns the root when this retires the
    /// revision (superseded and reader count reached zero).
    pub(crate) fn release(&self, revision: u64) -> Option<T> {
        let mut inner = self.inner.lock();
        let current = inner.current;
        let hold = inner.holds.get_mut(&revision)?;
        hold.readers = hold.readers.saturating_sub(1);
        if hold.readers == 0 && revision != current {
            let retired = inner.holds.remove(&revision)?;
            tracing::debug!(revision, "snapshot retired");
            return Some(retired.root);
        }
        None
    }

    /// Installs a new current revision and sweeps superseded revisions with
    /// no readers, returning their roots for advisory reclamation.
    pub(crate) fn publish(&self, revision: u64, root: T) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.current = revision;
        inner.holds.insert(revision, Hold { root, readers: 0 });

        let mut retired = Vec::new();
        inner.holds.retain(|&rev, hold| {
            if rev != revision && hold.readers == 0 {
                tracing::debug!(revision = rev, "snapshot retired");
                retired.push(hold.root.clone());
                false
            } else {
                true
            }
        });
        retired
    }

    #[cfg(test)]
    pub(crate) fn held_revisions(&self) -> usize {
        self.inner.lock().holds.len()
    }
}
