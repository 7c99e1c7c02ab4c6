// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # Software Transactional Memory
//!
//! A TL2 (Transactional Locking II) software transactional memory runtime.
//! Concurrent actors execute blocks of reads and writes against shared
//! [`TVar`]s as if each block ran in isolation, without taking an explicit
//! lock themselves. Conflicts between concurrent transactions are resolved
//! by discarding and re-running the losing attempt — there is no blocking
//! and no deadlock between transactions, only optimistic retry.
//!
//! ```
//! use tl2_stm::Stm;
//!
//! let stm = Stm::new();
//! let balance = stm.create(100usize);
//!
//! let new_balance = stm
//!     .atomically(|tx| {
//!         let current = tx.read(&balance);
//!         tx.write(&balance, current + 10);
//!         current + 10
//!     })
//!     .expect("transaction engine invariant violated");
//!
//! assert_eq!(new_balance, 110);
//! assert_eq!(balance.read_atomic(), 110);
//! ```
//!
//! Every transactional variable belongs to exactly one [`Stm`] instance —
//! the engine that owns the global version clock ordering commits to it.
//! A single process may run several independent `Stm` instances, each its
//! own transactional universe.

mod clock;
mod error;
mod lock;
mod stm;
mod sync;
mod transaction;
mod tvar;

pub use error::StmError;
pub use stm::Stm;
pub use transaction::Transaction;
pub use tvar::TVar;
