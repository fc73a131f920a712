// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

//! `CoreMempool` ties the shared [`TxLog`] together with a dedup cache and
//! capacity/size policy, giving a concrete implementation of the
//! admission-engine interface spec.md §6 names. It intentionally does not
//! prioritize, batch, or order beyond list order — spec.md §1's Non-goals.

use crate::{
    config::MempoolConfig,
    core_mempool::{
        log::{Node, TxLog},
        transaction::{hash_tx, TxHash, WrappedTx},
    },
    error::MempoolError,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// Attribution for an inbound `CheckTx` call: either a remote peer's
/// mempool ID, or [`crate::peer_id::LOCAL_MEMPOOL_ID`] for a locally
/// injected transaction (spec.md §4.2 step 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SenderInfo {
    pub mempool_id: u16,
    pub height: u64,
}

/// Rotating two-generation dedup cache, grounded on the teacher's
/// `TxnCache` (`core_mempool::mempool::TxnCache`): once the live generation
/// exceeds `size`, it becomes the "old" generation and a fresh one starts,
/// so membership checks stay O(1) without unbounded growth.
struct DedupCache {
    old: HashSet<TxHash>,
    current: HashSet<TxHash>,
    size: usize,
}

impl DedupCache {
    fn new(size: usize) -> Self {
        Self { old: HashSet::new(), current: HashSet::new(), size }
    }

    fn contains(&self, hash: &TxHash) -> bool {
        self.current.contains(hash) || self.old.contains(hash)
    }

    fn insert(&mut self, hash: TxHash) {
        self.current.insert(hash);
        if self.current.len() > self.size {
            self.old = std::mem::take(&mut self.current);
        }
    }
}

pub struct CoreMempool {
    log: Arc<TxLog>,
    by_hash: Mutex<HashMap<TxHash, Arc<Node>>>,
    dedup: Mutex<DedupCache>,
    max_tx_bytes: usize,
    /// The local node's current block height, as of the last call to
    /// `set_height`. `admit` stamps new transactions with this value; tests
    /// that need fine control over a transaction's admission height call
    /// `check_tx` directly instead.
    current_height: AtomicU64,
}

impl CoreMempool {
    pub fn new(config: &MempoolConfig) -> Self {
        Self {
            log: Arc::new(TxLog::new(config.mempool_capacity)),
            by_hash: Mutex::new(HashMap::new()),
            dedup: Mutex::new(DedupCache::new(config.mempool_capacity.max(1))),
            max_tx_bytes: config.max_tx_bytes,
            current_height: AtomicU64::new(0),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.current_height.store(height, Ordering::Release);
    }

    pub fn height(&self) -> u64 {
        self.current_height.load(Ordering::Acquire)
    }

    /// Admits `tx` at the node's current height. This is what the receive
    /// loop calls for every inbound payload (spec.md §4.2 step 3).
    pub fn admit(&self, tx: Vec<u8>, sender: SenderInfo) -> Result<TxHash, MempoolError> {
        let height = self.height();
        self.check_tx(tx, height, sender)
    }

    pub fn log(&self) -> Arc<TxLog> {
        self.log.clone()
    }

    /// Non-blocking admission (spec.md §6 `CheckTx`). Errors are
    /// informational only; the caller (the receive loop) logs and
    /// suppresses them without penalizing the sending peer.
    pub fn check_tx(&self, tx: Vec<u8>, height: u64, sender: SenderInfo) -> Result<TxHash, MempoolError> {
        if tx.is_empty() {
            return Err(MempoolError::Empty);
        }
        if tx.len() > self.max_tx_bytes {
            return Err(MempoolError::TooLarge(tx.len(), self.max_tx_bytes));
        }

        let hash = hash_tx(&tx);
        let mut dedup = self.dedup.lock().unwrap();
        if dedup.contains(&hash) {
            return Err(MempoolError::AlreadyKnown);
        }
        dedup.insert(hash);
        drop(dedup);

        let wrapped = WrappedTx::new(tx, height, sender.mempool_id);
        let (node, evicted) = self.log.push(wrapped);
        let mut by_hash = self.by_hash.lock().unwrap();
        by_hash.insert(hash, node);
        // `TxLog::push` evicted the old head to stay within capacity; prune
        // its entry here too, or `by_hash` (and the `Arc<Node>`/tx bytes it
        // keeps alive) would grow unbounded regardless of mempool_capacity.
        if let Some(evicted_hash) = evicted {
            by_hash.remove(&evicted_hash);
        }
        drop(by_hash);
        Ok(hash)
    }

    /// Completes when the log becomes non-empty after being empty
    /// (spec.md §6 `WaitForNextTx`).
    pub async fn wait_for_next_tx(&self) {
        self.log.wait_for_next_tx().await
    }

    /// Current head of the gossip view; may be `None` racily
    /// (spec.md §6 `NextGossipTx`).
    pub fn next_gossip_tx(&self) -> Option<Arc<Node>> {
        self.log.head()
    }

    /// Sender-set membership probe by hash (spec.md §6 `TxHasPeer`).
    pub fn tx_has_peer(&self, hash: &TxHash, peer_mempool_id: u16) -> bool {
        self.by_hash
            .lock()
            .unwrap()
            .get(hash)
            .map(|node| node.value.has_peer(peer_mempool_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }
}
