//! # Multi-Version Concurrency Control
//!
//! The engine provides Snapshot Isolation with a Single-Writer /
//! Multi-Reader model:
//!
//! - At most one writer mutates the structure at a time, serialized by
//!   [`WriteTransaction`]. Every mutation builds fresh page copies and
//!   publishes them by swapping the tree's root reference; nothing a reader
//!   can reach is ever modified.
//! - Readers never block. A cursor binds to the root current at creation
//!   time and observes that revision in full, indefinitely, regardless of
//!   how many commits happen afterwards.
//!
//! ## Revision Lifecycle
//!
//! ```text
//! write op ──> fresh page copies ──> publish(rev N+1) ──> current
//!                                         │
//!            cursors on rev N keep it held┘
//!            last cursor close ──> revision retired, pages reclaimable
//! ```
//!
//! A rolled-back write publishes nothing; the pages it built are dropped
//! without ever being observed.
//!
//! ## Shared State
//!
//! The only shared mutable cell is the current-root slot inside
//! [`RevisionTracker`]: read on every cursor creation, overwritten exactly
//! once per committed write. Everything reachable from a published root is
//! immutable and shared across threads without synchronization.

mod revisions;
mod transaction;

pub(crate) use revisions::RevisionTracker;
pub use transaction::WriteTransaction;
