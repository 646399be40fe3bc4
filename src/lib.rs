//! # mvbtree - Copy-on-Write MVCC B-Tree
//!
//! An embedded, ordered key-value engine built on multi-version concurrency
//! control: any number of readers iterate stable point-in-time snapshots
//! while a single writer publishes new revisions, and nobody ever waits on
//! anybody's locks to read.
//!
//! - **Copy-on-write pages**: published pages are immutable; a write copies
//!   only the root-to-leaf path it touches
//! - **Atomic root swap**: readers see the old tree or the new tree, never
//!   anything in between
//! - **Duplicate keys as sub-trees**: a key's values live in a nested tree
//!   built from the same page engine, so duplicate sets scale like the tree
//!   itself
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use mvbtree::{BTreeBuilder, LongSerializer, StringSerializer};
//!
//! # fn main() -> eyre::Result<()> {
//! let tree = BTreeBuilder::new(Arc::new(LongSerializer), Arc::new(StringSerializer))
//!     .page_size(16)
//!     .allow_duplicates(true)
//!     .build()?;
//!
//! tree.insert(1, "one".to_string())?;
//! tree.insert(2, "two".to_string())?;
//!
//! let mut cursor = tree.browse()?;
//! while cursor.has_next()? {
//!     let tuple = cursor.next()?;
//!     println!("{} -> {}", tuple.key, tuple.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Public API (BTree, Cursor)      │
//! ├───────────────────┬─────────────────┤
//! │  Writer Guard     │ Revision Tracker │
//! │  (one at a time)  │ (snapshot holds) │
//! ├───────────────────┴─────────────────┤
//! │   COW Page Engine (leaf/node/split)  │
//! ├─────────────────────────────────────┤
//! │  Duplicate Sub-Trees (same engine)   │
//! ├─────────────────────────────────────┤
//! │  Serializers  │  Page Store (seam)   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Model
//!
//! Every committed write produces revision `n + 1` with a brand-new root.
//! A cursor binds to the revision current when it is opened and keeps that
//! revision alive until closed; superseded revisions with no open cursors
//! are retired and their roots reported to the page store for reclamation.
//!
//! Durable page storage and byte-level page images are collaborator seams
//! ([`PageStore`], [`ElementSerializer`]); the engine itself is purely
//! in-memory and shares pages by reference.

pub mod btree;
pub mod mvcc;
pub mod serial;
pub mod store;

pub use btree::{BTree, BTreeBuilder, Cursor, Tuple};
pub use mvcc::WriteTransaction;
pub use serial::{
    ByteArraySerializer, Element, ElementSerializer, IntSerializer, LongSerializer,
    StringSerializer, UnitSerializer,
};
pub use store::{MemoryStore, PageRef, PageStore};
