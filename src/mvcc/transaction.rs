//! # Write Transaction Guard
//!
//! Exclusive writer right for a tree. The guard is an explicit
//! acquire/release object rather than a scoped lock so that the contract —
//! and its misuse conditions — are testable independent of any particular
//! concurrency primitive.
//!
//! ## Contract
//!
//! - `start()` blocks until the writer right is free, then takes it.
//! - `try_start()` fails instead of blocking when a writer is active.
//! - `commit()` / `rollback()` release the right; calling either without a
//!   started transaction is a programming error reported as a fatal error,
//!   never retried or swallowed.
//!
//! The guard serializes writers only. Readers never touch it.

use eyre::{bail, Result};
use parking_lot::{Condvar, Mutex};

/// Single-writer mutual exclusion for structural mutations.
pub struct WriteTransaction {
    started: Mutex<bool>,
    cond: Condvar,
}

impl WriteTransaction {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Acquires the writer right, blocking while another writer holds it.
    pub fn start(&self) {
        let mut started = self.started.lock();
        while *started {
            self.cond.wait(&mut started);
        }
        *started = true;
    }

    /// Acquires the writer right or fails immediately if a writer is active.
    pub fn try_start(&self) -> Result<()> {
        let mut started = self.started.lock();
        if *started {
            bail!("cannot start a write transaction while one is already active");
        }
        *started = true;
        Ok(())
    }

    /// Releases the writer right after a successful mutation.
    pub fn commit(&self) -> Result<()> {
        let mut started = self.started.lock();
        if !*started {
            bail!("cannot commit a write transaction that has not been started");
        }
        *started = false;
        self.cond.notify_one();
        Ok(())
    }

    /// Releases the writer right, discarding the attempt.
    pub fn rollback(&self) -> Result<()> {
        let mut started = self.started.lock();
        if !*started {
            bail!("cannot roll back a write transaction that has not been started");
        }
        *started = false;
        self.cond.notify_one();
        Ok(())
    }

    /// True while a writer holds the right.
    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }
}

impl Default for WriteTransaction {
    fn default() -> Self {
        Self::new()
    }
}
