// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The transaction engine: the unbounded retry loop that drives a
//! transaction body through `Begin`, speculative execution, and the
//! five-step commit protocol.

use crate::{
    clock::VersionClock,
    error::StmError,
    transaction::{AcquireOutcome, Transaction},
    tvar::TVar,
};
use log::*;
use std::{fmt::Debug, sync::Arc};

/// The STM runtime: owns the global version clock and hands out
/// transactional variables and transaction attempts against it.
///
/// Cloning an [`Stm`] clones a handle to the same clock (it is cheap, like
/// cloning an `Arc`) — every clone is part of the same transactional
/// universe. Two separate `Stm::new()` calls are two independent universes
/// with independent clocks; variables created from one are never
/// compatible with transactions run against the other.
#[derive(Clone, Default)]
pub struct Stm {
    clock: Arc<VersionClock>,
    attempt_ids: Arc<VersionClock>,
}

impl Stm {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(VersionClock::new()),
            attempt_ids: Arc::new(VersionClock::new()),
        }
    }

    /// Creates a new transactional variable holding `initial`, stamped with
    /// the engine's current clock value.
    pub fn create<T>(&self, initial: T) -> TVar<T>
    where
        T: Clone + Debug,
    {
        TVar::new(initial, self.clock.load())
    }

    /// Runs `body` to completion, restarting it as many times as a conflict
    /// requires, and returns exactly the value the successful attempt
    /// returned.
    ///
    /// `body` may be invoked any number of times — once per attempt,
    /// including attempts discarded due to a conflict — so it should not
    /// perform effects it cannot afford to repeat. Only a fatal,
    /// engine-invariant violation is ever returned as `Err`; every retryable
    /// condition is resolved inside this loop.
    pub fn atomically<T, F, U>(&self, body: F) -> Result<U, StmError>
    where
        F: Fn(&mut Transaction<T>) -> U,
        T: Clone + Debug,
    {
        loop {
            let attempt_id = self.attempt_ids.increment();
            let mut tx = Transaction::new(self.clock.load());

            trace!("tx({attempt_id}): begin at read version {}", tx.read_version());

            let result = body(&mut tx);

            if tx.should_restart() {
                debug!("tx({attempt_id}): read conflict, restarting");
                continue;
            }

            if tx.is_read_only() {
                // Short-circuit: every read already validated against
                // read_version and nothing tripped the restart flag, so this
                // attempt is trivially serializable. Neither the clock nor
                // any lock is touched.
                trace!("tx({attempt_id}): read-only, committing without touching the clock");
                return Ok(result);
            }

            let lock_set = match tx.acquire_locks() {
                Ok(lock_set) => lock_set,
                Err(AcquireOutcome::Retry) => {
                    debug!("tx({attempt_id}): lock acquisition contended, restarting");
                    continue;
                }
                Err(AcquireOutcome::Fatal(err)) => {
                    error!("tx({attempt_id}): fatal error acquiring locks: {err}");
                    return Err(err);
                }
            };

            let write_version = self.clock.increment();
            tx.set_write_version(write_version);
            trace!("tx({attempt_id}): write version {write_version}");

            // If nothing else committed between Begin and now, the read set
            // cannot have changed and validation is unnecessary.
            if tx.read_version() != write_version - 1 && !tx.validate_read_set(&lock_set) {
                debug!("tx({attempt_id}): read-set validation failed, restarting");
                release_lock_set(&lock_set);
                continue;
            }

            if let Err(err) = tx.publish(write_version, &lock_set) {
                error!("tx({attempt_id}): fatal error publishing commit: {err}");
                return Err(err);
            }

            trace!("tx({attempt_id}): committed at version {write_version}");
            return Ok(result);
        }
    }
}

fn release_lock_set<T>(lock_set: &std::collections::HashSet<TVar<T>>) {
    for var in lock_set {
        var.lock()
            .release()
            .expect("releasing a lock set this attempt just acquired must not fail");
    }
}
