// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The versioned lock — a single 64-bit atomic word packing a 1-bit lock
//! flag and a 63-bit version number, one per transactional variable.
//!
//! The encoding matches `talhof8/kashmir`'s `internal.VersionedLock`: an
//! *unlocked* word is the version alone; a *locked* word has bit 63 set and
//! the version in the low 63 bits. This lock never spins and never blocks —
//! every acquire attempt either succeeds immediately or returns an error.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error as DeriveError;

/// Bit 63. Set in the raw word when the lock is held.
const LOCK_BIT: u64 = 1 << 63;

/// Mask for the 63-bit version field.
const VERSION_MASK: u64 = LOCK_BIT - 1;

/// Failure kinds a [`VersionedLock`] operation can report.
///
/// [`LockError::AlreadyLocked`] is the ordinary contention case and is
/// handled by restarting the transaction. The remaining three are
/// programming-error-level failures: they indicate the raw word changed
/// underneath a CAS we believed would succeed, that `Release` was called on
/// a lock nobody held, or that the clock has exhausted the 63-bit version
/// space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveError)]
pub enum LockError {
    #[error("lock is already held")]
    AlreadyLocked,

    #[error("lock word was modified concurrently")]
    LockModified,

    #[error("lock is already released")]
    AlreadyReleased,

    #[error("version number cannot be larger than (2^63)-1")]
    VersionOverflow,
}

/// A single 64-bit atomic word: bit 63 is the lock flag, bits 0..62 are the
/// version. Holds no notion of ownership — callers track who holds it via
/// their own lock-set bookkeeping in [`crate::transaction`].
#[derive(Debug)]
pub struct VersionedLock(AtomicU64);

impl VersionedLock {
    /// Creates an unlocked lock carrying `version`.
    pub fn new(version: u64) -> Self {
        Self(AtomicU64::new(version))
    }

    /// Atomically loads the word and decodes it into `(locked, version, raw)`.
    pub fn sample(&self) -> (bool, u64, u64) {
        let raw = self.0.load(Ordering::SeqCst);
        (Self::is_locked(raw), Self::version_of(raw), raw)
    }

    /// Non-blocking acquire. Never spins: a single failed CAS is reported,
    /// not retried internally.
    pub fn try_acquire(&self) -> Result<(), LockError> {
        let (locked, version, raw) = self.sample();
        if locked {
            return Err(LockError::AlreadyLocked);
        }

        let desired = Self::encode(true, version)?;
        self.compare_and_swap(raw, desired)
    }

    /// Releases the lock, leaving its version unchanged.
    pub fn release(&self) -> Result<(), LockError> {
        let (locked, version, raw) = self.sample();
        if !locked {
            return Err(LockError::AlreadyReleased);
        }

        let desired = Self::encode(false, version)?;
        self.compare_and_swap(raw, desired)
    }

    /// Releases the lock and publishes `new_version` in the same
    /// compare-and-swap, used at commit time to make a write visible.
    pub fn versioned_release(&self, new_version: u64) -> Result<(), LockError> {
        let (locked, _, raw) = self.sample();
        if !locked {
            return Err(LockError::AlreadyReleased);
        }

        let desired = Self::encode(false, new_version)?;
        self.compare_and_swap(raw, desired)
    }

    fn compare_and_swap(&self, current: u64, new: u64) -> Result<(), LockError> {
        self.0
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| LockError::LockModified)
    }

    fn is_locked(raw: u64) -> bool {
        raw & LOCK_BIT != 0
    }

    fn version_of(raw: u64) -> u64 {
        raw & VERSION_MASK
    }

    /// Packs `(locked, version)` into a raw word. Refuses any version whose
    /// bit 63 is set — that would collide with the lock bit.
    fn encode(locked: bool, version: u64) -> Result<u64, LockError> {
        if version & LOCK_BIT != 0 {
            return Err(LockError::VersionOverflow);
        }

        Ok(if locked { LOCK_BIT | version } else { version })
    }
}
