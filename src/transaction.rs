// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The per-transaction context: the read/write logs a running transaction
//! accumulates, and the commit-time protocol that validates and publishes
//! them.

use crate::{error::StmError, lock::LockError, tvar::TVar};
use log::*;
use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
};

/// Outcome of attempting to acquire the commit-time lock set. `Retry` is the
/// ordinary contention case; `Fatal` wraps an engine-invariant violation
/// that must propagate to the caller.
pub(crate) enum AcquireOutcome {
    Retry,
    Fatal(StmError),
}

/// Everything a running transaction body sees and accumulates: the read and
/// write logs, the snapshot read version, the write version assigned at
/// commit, and the restart flag a conflicting [`Transaction::read`] sets.
///
/// A `Transaction` is created fresh for every attempt by
/// [`crate::Stm::atomically`] and discarded on restart or after commit —
/// never shared across actors, never reused across attempts.
pub struct Transaction<T> {
    read_version: u64,
    write_version: u64,
    restart: bool,
    read_log: HashSet<TVar<T>>,
    write_log: HashMap<TVar<T>, T>,
}

impl<T> Transaction<T>
where
    T: Clone + Debug,
{
    pub(crate) fn new(read_version: u64) -> Self {
        Self {
            read_version,
            write_version: 0,
            restart: false,
            read_log: HashSet::new(),
            write_log: HashMap::new(),
        }
    }

    pub(crate) fn should_restart(&self) -> bool {
        self.restart
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.write_log.is_empty()
    }

    /// Reads `var`'s value.
    ///
    /// Read-your-own-writes: if `var` is already pending in the write log,
    /// the pending value is returned directly with no lock or clock
    /// interaction. Otherwise the value is sampled strictly between two
    /// lock samples; a conflict sets the restart flag but still returns the
    /// (possibly stale) value, since the caller may keep running on data
    /// that will be discarded if the attempt restarts.
    pub fn read(&mut self, var: &TVar<T>) -> T {
        if let Some(pending) = self.write_log.get(var) {
            return pending.clone();
        }

        let (pre_locked, pre_version, _) = var.lock().sample();
        let value = var.load();
        let (_post_locked, post_version, _) = var.lock().sample();

        self.read_log.insert(var.clone());

        if pre_locked || pre_version != post_version || pre_version > self.read_version {
            trace!(
                "read conflict: locked={pre_locked} pre_version={pre_version} post_version={post_version} read_version={}",
                self.read_version
            );
            self.restart = true;
        }

        value
    }

    /// Buffers `value` as the variable's pending write. A later write to the
    /// same variable overwrites an earlier one; neither touches the lock or
    /// the clock.
    pub fn write(&mut self, var: &TVar<T>, value: T) {
        self.write_log.insert(var.clone(), value);
    }

    /// Commit protocol step 1: acquire every lock in the write set, then
    /// every not-yet-held lock in the read set.
    ///
    /// On any `AlreadyLocked`, every lock already acquired this call is
    /// released and `Retry` is reported. A `LockModified`/`VersionOverflow`
    /// is an engine-invariant violation and reported as `Fatal` after the
    /// same cleanup.
    pub(crate) fn acquire_locks(&self) -> Result<HashSet<TVar<T>>, AcquireOutcome> {
        let mut lock_set: HashSet<TVar<T>> = HashSet::with_capacity(self.write_log.len() + self.read_log.len());

        for var in self.write_log.keys() {
            if let Err(err) = var.lock().try_acquire() {
                release_all(&lock_set);
                return Err(classify_acquire_failure(err, "acquire write set"));
            }
            lock_set.insert(var.clone());
        }

        for var in &self.read_log {
            if lock_set.contains(var) {
                continue;
            }
            if let Err(err) = var.lock().try_acquire() {
                release_all(&lock_set);
                return Err(classify_acquire_failure(err, "acquire read set"));
            }
            lock_set.insert(var.clone());
        }

        Ok(lock_set)
    }

    /// Commit protocol step 3: validates the read set against `write_version`.
    /// Skipped entirely by the caller when no other transaction committed
    /// between `Begin` and now.
    pub(crate) fn validate_read_set(&self, lock_set: &HashSet<TVar<T>>) -> bool {
        for var in &self.read_log {
            let (locked, version, _) = var.lock().sample();
            let locked_by_us = lock_set.contains(var);

            if (locked && !locked_by_us) || version > self.read_version {
                debug!(
                    "read-set validation failed: locked={locked} locked_by_us={locked_by_us} version={version} read_version={}",
                    self.read_version
                );
                return false;
            }
        }
        true
    }

    /// Commit protocol steps 4 and 5: publishes every write with
    /// `write_version` and releases every held lock.
    ///
    /// A `VersionedRelease`/`Release` failure here is fatal: the lock set
    /// was just acquired by this same attempt, so nothing but a corrupted
    /// invariant can make a release fail. The write's prior value is
    /// restored best-effort before returning the error.
    pub(crate) fn publish(&self, write_version: u64, lock_set: &HashSet<TVar<T>>) -> Result<(), StmError> {
        let mut released: HashSet<TVar<T>> = HashSet::with_capacity(lock_set.len());

        for (var, value) in &self.write_log {
            let previous = var.store(value.clone());
            if let Err(err) = var.lock().versioned_release(write_version) {
                var.store(previous);
                return Err(StmError::from_fatal(err, "publish"));
            }
            released.insert(var.clone());
        }

        for var in &self.read_log {
            if released.contains(var) {
                continue;
            }
            if let Err(err) = var.lock().release() {
                return Err(StmError::from_fatal(err, "release read set"));
            }
            released.insert(var.clone());
        }

        Ok(())
    }

    pub(crate) fn set_write_version(&mut self, write_version: u64) {
        self.write_version = write_version;
    }

    pub(crate) fn read_version(&self) -> u64 {
        self.read_version
    }

    pub(crate) fn write_version(&self) -> u64 {
        self.write_version
    }

    #[cfg(test)]
    pub(crate) fn read_log_len(&self) -> usize {
        self.read_log.len()
    }
}

fn classify_acquire_failure(err: LockError, phase: &'static str) -> AcquireOutcome {
    match err {
        LockError::AlreadyLocked => AcquireOutcome::Retry,
        other => AcquireOutcome::Fatal(StmError::from_fatal(other, phase)),
    }
}

/// Releases every lock in `lock_set`. Only ever called on a set this same
/// attempt just acquired, so a release failure here can only mean the
/// engine's own bookkeeping is broken — matching `kashmir`'s
/// `releaseLockSet`, which panics rather than tries to recover.
fn release_all<T>(lock_set: &HashSet<TVar<T>>) {
    for var in lock_set {
        var.lock()
            .release()
            .expect("releasing a lock set this attempt just acquired must not fail");
    }
}
