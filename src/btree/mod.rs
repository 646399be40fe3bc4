//! # Copy-on-Write B-Tree
//!
//! The structural core of the engine: immutable versioned pages, the
//! recursive insert/delete machinery with split/borrow/merge rebalancing,
//! duplicate-key sub-trees, and the snapshot-bound cursor.
//!
//! ## Layout
//!
//! - `page`: the `Page` enum, lazy key slots, root-level entry points
//!   shared by the outer tree and the duplicate sub-trees
//! - `leaf` / `node`: per-kind copy-on-write operations and rebalancing
//! - `values`: `ValueHolder`, one inline value or a nested value tree
//! - `cursor`: bidirectional, duplicate-aware snapshot iteration
//! - `tree`: the public `BTree` facade for writer serialization, revision
//!   publication, and lookups
//!
//! ## The Copy-on-Write Rule
//!
//! No page reachable from a published root is ever mutated. A write builds
//! fresh pages for the root-to-leaf path it touches (sharing every untouched
//! subtree by reference) and publishes the new root in one atomic swap.
//! Everything else in this module follows from that rule.

mod cursor;
mod leaf;
mod node;
mod page;
mod result;
mod tree;
mod values;

pub use cursor::Cursor;
pub use result::Tuple;
pub use tree::{BTree, BTreeBuilder};
