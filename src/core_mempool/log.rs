// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The shared transaction log: a singly-linked intrusive list with
//! await-next and garbage-detachment semantics (spec.md §3, §9).
//!
//! Each [`Node`] owns a `Notify` that fires both when its successor is
//! linked in and when the node itself is evicted from the list ("detached
//! signal" — spec.md §9's sentinel-successor design). A broadcaster that
//! holds an `Arc<Node>` keeps the node's memory alive even after eviction;
//! stepping past an evicted node always yields `None`, regardless of
//! whether a successor was later linked, which is exactly the "restart from
//! head" behavior spec.md §4.4 requires.

use crate::core_mempool::transaction::{TxHash, WrappedTx};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::Notify;

pub struct Node {
    pub value: WrappedTx,
    next: Mutex<Option<Arc<Node>>>,
    next_ready: Notify,
    detached: AtomicBool,
}

impl Node {
    fn new(value: WrappedTx) -> Self {
        Self {
            value,
            next: Mutex::new(None),
            next_ready: Notify::new(),
            detached: AtomicBool::new(false),
        }
    }

    /// Non-blocking step: `None` means either there is no successor yet, or
    /// this node has been detached (caller must distinguish by awaiting
    /// [`Node::await_next`] instead if it wants to block).
    pub fn next(self: &Arc<Self>) -> Option<Arc<Node>> {
        if self.detached.load(Ordering::Acquire) {
            return None;
        }
        self.next.lock().unwrap().clone()
    }

    /// Waits until either a successor exists or this node is detached, then
    /// returns the result of [`Node::next`] (spec.md §4.4 "Advance").
    pub async fn await_next(self: &Arc<Self>) -> Option<Arc<Node>> {
        loop {
            let notified = self.next_ready.notified();
            if self.detached.load(Ordering::Acquire) {
                return None;
            }
            if let Some(next) = self.next.lock().unwrap().clone() {
                return Some(next);
            }
            notified.await;
        }
    }

    fn link_next(&self, node: Arc<Node>) {
        *self.next.lock().unwrap() = Some(node);
        self.next_ready.notify_waiters();
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.next_ready.notify_waiters();
    }
}

/// Concurrent append-only (until capacity forces eviction) list, shared
/// between the admission engine (writer) and every broadcaster (reader).
pub struct TxLog {
    head: Mutex<Option<Arc<Node>>>,
    tail: Mutex<Option<Arc<Node>>>,
    non_empty: Notify,
    len: AtomicUsize,
    capacity: usize,
}

impl TxLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            head: Mutex::new(None),
            tail: Mutex::new(None),
            non_empty: Notify::new(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Appends `value`, evicting the oldest node if the list is now over
    /// capacity. Returns the new node (so the caller can index it by hash)
    /// and, if an eviction happened, the evicted node's hash so the caller
    /// can prune its own by-hash index (spec.md §3 "the log is bounded";
    /// `TxLog` has no knowledge of `by_hash` itself, so it reports the
    /// eviction rather than reaching into the caller's index).
    pub fn push(&self, value: WrappedTx) -> (Arc<Node>, Option<TxHash>) {
        let node = Arc::new(Node::new(value));

        let mut tail_guard = self.tail.lock().unwrap();
        let was_empty = tail_guard.is_none();
        if let Some(old_tail) = tail_guard.take() {
            old_tail.link_next(node.clone());
        } else {
            *self.head.lock().unwrap() = Some(node.clone());
        }
        *tail_guard = Some(node.clone());
        drop(tail_guard);

        self.len.fetch_add(1, Ordering::AcqRel);
        if was_empty {
            self.non_empty.notify_waiters();
        }
        let evicted = if self.len() > self.capacity { self.evict_oldest() } else { None };
        (node, evicted)
    }

    fn evict_oldest(&self) -> Option<TxHash> {
        let mut head_guard = self.head.lock().unwrap();
        if let Some(old_head) = head_guard.take() {
            let next = old_head.next.lock().unwrap().clone();
            *head_guard = next;
            drop(head_guard);
            old_head.detach();
            self.len.fetch_sub(1, Ordering::AcqRel);
            Some(old_head.value.hash)
        } else {
            None
        }
    }

    /// Current head of the gossip view; may be `None` racily even right
    /// after `wait_for_next_tx` resolves (spec.md §6, §4.4 "Restart").
    pub fn head(&self) -> Option<Arc<Node>> {
        self.head.lock().unwrap().clone()
    }

    /// Completes when the log becomes non-empty after being empty
    /// (spec.md §6 `WaitForNextTx`).
    pub async fn wait_for_next_tx(&self) {
        loop {
            let notified = self.non_empty.notified();
            if self.head.lock().unwrap().is_some() {
                return;
            }
            notified.await;
        }
    }
}
