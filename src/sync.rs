// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Swaps in a deadlock-detecting mutex for the transactional variable's
//! value cell when the `no_deadlocks` feature is enabled, otherwise falls
//! back to `std::sync`. The value cell is only ever held for the duration
//! of a single load or store, so deadlocks would indicate a bug rather
//! than contention.

#[cfg(feature = "no_deadlocks")]
pub use no_deadlocks::{Mutex, MutexGuard};

#[cfg(not(feature = "no_deadlocks"))]
pub use std::sync::{Mutex, MutexGuard};
