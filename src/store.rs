//! # Page Store Seam
//!
//! Durable page storage (file headers, free-page tracking, flush mechanics)
//! is a collaborator, not part of this engine. The engine's only requirements
//! are a source of logical page references for pages created by copy-on-write
//! and an advisory channel to report pages that have become unreachable.
//!
//! Byte-level `read`/`write` of page images belongs to the durable
//! collaborator as well; the in-memory engine shares pages by reference and
//! never produces a page image itself.
//!
//! `free` is advisory: a store may defer actual reclamation arbitrarily, and
//! [`MemoryStore`] only counts it. Memory safety never depends on `free` —
//! pages are dropped when the last root or cursor referencing them goes away.

use std::sync::atomic::{AtomicU64, Ordering};

/// Logical reference to a page, unique for the lifetime of a store.
pub type PageRef = u64;

/// Allocation and reclamation seam between the engine and its storage
/// collaborator.
pub trait PageStore: Send + Sync {
    /// Hands out a fresh logical page reference.
    fn allocate(&self) -> PageRef;

    /// Advises the store that no published root or open cursor can reach
    /// this page any longer.
    fn free(&self, page: PageRef);

    /// Number of references handed out so far.
    fn allocated(&self) -> u64;

    /// Number of pages advised as reclaimable so far.
    fn freed(&self) -> u64;
}

/// In-memory store: monotonic reference counter plus reclamation accounting.
#[derive(Debug, Default)]
pub struct MemoryStore {
    next: AtomicU64,
    freed: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryStore {
    fn allocate(&self) -> PageRef {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    fn free(&self, page: PageRef) {
        tracing::trace!(page, "page advised reclaimable");
        self.freed.fetch_add(1, Ordering::Relaxed);
    }

    fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    fn freed(&self) -> u64 {
        self.freed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_monotonic() {
        let store = MemoryStore::new();
        let a = store.allocate();
        let b = store.allocate();
        assert!(b > a);
        assert_eq!(store.allocated(), 2);
    }

    #[test]
    fn test_free_is_counted() {
        let store = MemoryStore::new();
        let a = store.allocate();
        store.free(a);
        assert_eq!(store.freed(), 1);
    }
}
