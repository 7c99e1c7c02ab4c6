// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The transactional variable.

use crate::{lock::VersionedLock, sync::Mutex};
use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::Arc,
};

struct Inner<T> {
    value: Mutex<T>,
    lock: VersionedLock,
}

/// A handle to a value shared across transactions, guarded by one
/// [`VersionedLock`]. Cloning a [`TVar`] clones the handle, not the value —
/// all clones refer to the same underlying cell.
///
/// The payload is opaque to the engine: it is moved in and out of the value
/// cell on load/store, never compared or inspected. Any `Clone + Debug`
/// type works; equality and numeric semantics are entirely the caller's
/// concern.
pub struct TVar<T> {
    inner: Arc<Inner<T>>,
}

impl<T> TVar<T>
where
    T: Clone + Debug,
{
    /// Creates a variable holding `value`, with its lock unlocked at
    /// version `version`. Used by [`crate::Stm::create`], which stamps new
    /// variables with the engine's current clock value so an in-flight
    /// transaction started before the variable existed can never observe
    /// it.
    pub(crate) fn new(value: T, version: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(value),
                lock: VersionedLock::new(version),
            }),
        }
    }

    pub(crate) fn lock(&self) -> &VersionedLock {
        &self.inner.lock
    }

    /// Returns the lock's current version, with no atomicity relationship
    /// to [`TVar::read_atomic`] beyond what a single [`VersionedLock::sample`]
    /// gives. Diagnostic/test use only — transaction bodies never need it.
    pub fn version(&self) -> u64 {
        let (_, version, _) = self.inner.lock.sample();
        version
    }

    /// Reads the current value without going through a transaction. There
    /// is no version check here: the caller accepts whatever is currently
    /// committed. Intended for tests and for reading final results after
    /// all transactional actors have finished, not for use inside a running
    /// transaction body (use [`crate::Transaction::read`] there instead).
    pub fn read_atomic(&self) -> T {
        self.inner.value.lock().expect("value mutex poisoned").clone()
    }

    /// Loads the current value, used internally by [`crate::Transaction::read`]
    /// strictly between the two lock samples that detect a concurrent commit.
    pub(crate) fn load(&self) -> T {
        self.inner.value.lock().expect("value mutex poisoned").clone()
    }

    /// Replaces the value, returning the previous one so the commit
    /// protocol can restore it if `VersionedRelease` unexpectedly fails
    /// during publish.
    pub(crate) fn store(&self, value: T) -> T {
        std::mem::replace(&mut self.inner.value.lock().expect("value mutex poisoned"), value)
    }
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for TVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TVar").field("addr", &Arc::as_ptr(&self.inner)).finish()
    }
}

// A TVar's identity is the address of its shared cell, not its value — two
// variables holding equal values are still distinct transactional
// variables. This is what lets read and write logs use `TVar<T>` directly
// as a hash-set/hash-map key.
impl<T> Hash for TVar<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let addr = Arc::as_ptr(&self.inner) as usize;
        addr.hash(state);
    }
}

impl<T> PartialEq for TVar<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for TVar<T> {}
