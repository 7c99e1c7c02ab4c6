// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The error boundary a client of this crate actually sees.
//!
//! Retryable conditions — lock contention, a read-set validation failure, a
//! transaction body that tripped the restart flag — are resolved entirely
//! inside [`crate::Stm::atomically`]'s retry loop and never escape it. Only
//! the three fatal kinds below can surface, and only when the engine's own
//! invariants have been violated (not a transactional conflict).

use crate::lock::LockError;
use thiserror::Error as DeriveError;

/// A fatal, non-retryable failure of the engine itself.
///
/// Receiving one of these means the versioned-lock bookkeeping that the
/// commit protocol relies on has been violated — e.g. a compare-and-swap
/// that the protocol guaranteed would succeed lost its race, or the clock
/// has exhausted its 63-bit version space. None of these are raised by
/// ordinary contention between transactions.
#[derive(Debug, DeriveError)]
pub enum StmError {
    #[error("a versioned lock changed underneath a compare-and-swap the commit protocol assumed would succeed (during {0})")]
    LockModified(&'static str),

    #[error("attempted to release a versioned lock this transaction did not hold (during {0})")]
    AlreadyReleased(&'static str),

    #[error("the global version clock has exhausted its 63-bit range")]
    VersionOverflow,
}

impl StmError {
    /// Maps a [`LockError`] observed during a phase where only fatal
    /// outcomes are expected (publish/release) onto the client-facing
    /// error type, tagging it with the phase for diagnostics.
    pub(crate) fn from_fatal(err: LockError, phase: &'static str) -> Self {
        match err {
            LockError::LockModified => StmError::LockModified(phase),
            LockError::AlreadyReleased => StmError::AlreadyReleased(phase),
            LockError::VersionOverflow => StmError::VersionOverflow,
            LockError::AlreadyLocked => {
                unreachable!("AlreadyLocked is retryable and must be filtered out before reaching StmError")
            }
        }
    }
}
