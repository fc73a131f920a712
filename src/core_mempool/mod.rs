// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The local admission engine. Out of scope per spec.md §1/§6 beyond the
//! five operations the reactor consumes (`CheckTx`, `WaitForNextTx`,
//! `NextGossipTx`, `TxHasPeer`, and per-element accessors) — this module is
//! a minimal concrete implementation of those, needed to make the crate
//! buildable and testable end to end (SPEC_FULL.md §10).

mod mempool;
mod transaction;
mod log;

pub use log::{Node, TxLog};
pub use mempool::{CoreMempool, SenderInfo};
pub use transaction::{hash_tx, TxHash, WrappedTx};
