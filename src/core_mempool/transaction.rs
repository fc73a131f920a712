// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The wrapped transaction, owned by the admission engine (spec.md §3).
//! The broadcaster only ever reads its fields and the sender-set
//! membership; the admission engine (`CoreMempool`) is the only writer of
//! `tx`/`hash`/`height`, and both the admission engine and the broadcaster
//! write to the sender set — the former on `CheckTx`, the latter once a
//! send to a given peer completes (see DESIGN.md "sender-set insertion on
//! send").

use crate::peer_id::LOCAL_MEMPOOL_ID;
use sha3::{Digest, Sha3_256};
use std::{
    collections::HashSet,
    sync::Mutex,
};

pub type TxHash = [u8; 32];

pub fn hash_tx(bytes: &[u8]) -> TxHash {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// A transaction admitted into the shared log, with its sender-attribution
/// index. `senders` is the per-tx set of mempool IDs known to already hold
/// the transaction (spec.md §3, GLOSSARY "Sender set").
#[derive(Debug)]
pub struct WrappedTx {
    pub tx: Vec<u8>,
    pub hash: TxHash,
    pub height: u64,
    senders: Mutex<HashSet<u16>>,
}

impl WrappedTx {
    pub fn new(tx: Vec<u8>, height: u64, sender: u16) -> Self {
        let hash = hash_tx(&tx);
        let mut senders = HashSet::new();
        if sender != LOCAL_MEMPOOL_ID {
            senders.insert(sender);
        }
        Self { tx, hash, height, senders: Mutex::new(senders) }
    }

    pub fn has_peer(&self, peer_mempool_id: u16) -> bool {
        self.senders.lock().unwrap().contains(&peer_mempool_id)
    }

    /// Records that `peer_mempool_id` is now known to hold this transaction,
    /// either because it was the original sender (`CheckTx`) or because a
    /// broadcaster just forwarded it there.
    pub fn mark_known_by(&self, peer_mempool_id: u16) {
        if peer_mempool_id != LOCAL_MEMPOOL_ID {
            self.senders.lock().unwrap().insert(peer_mempool_id);
        }
    }

    #[cfg(test)]
    pub fn senders_snapshot(&self) -> HashSet<u16> {
        self.senders.lock().unwrap().clone()
    }
}
