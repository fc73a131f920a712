// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Peer-ID allocator. Assigns compact small-integer mempool IDs to peer
//! identities and reclaims them on disconnect. See spec.md §4.1.

use crate::error::ReactorError;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
};

/// Opaque peer identity. Treated as equality-comparable, variable-length
/// bytes (spec.md §3).
pub type PeerId = Vec<u8>;

/// Mempool ID `0` is reserved for "locally submitted / no peer".
pub const LOCAL_MEMPOOL_ID: u16 = 0;

struct AllocatorState {
    by_peer: HashMap<PeerId, u16>,
    by_id: HashMap<u16, PeerId>,
    free: BTreeSet<u16>,
    next_unused: u16,
}

/// Thread-safe allocator of `[1, cap]` integer IDs. All operations are safe
/// under arbitrary concurrency (spec.md §4.1); the order in which distinct
/// peers receive IDs is unspecified.
pub struct PeerIdAllocator {
    cap: u16,
    state: Mutex<AllocatorState>,
}

impl PeerIdAllocator {
    pub fn new(cap: usize) -> Self {
        let cap = cap.min(u16::MAX as usize) as u16;
        Self {
            cap,
            state: Mutex::new(AllocatorState {
                by_peer: HashMap::new(),
                by_id: HashMap::new(),
                free: BTreeSet::new(),
                next_unused: 1,
            }),
        }
    }

    /// Assigns the smallest unused ID to `peer`. Idempotent: calling this
    /// again for a peer that already has an ID returns the existing one
    /// rather than failing, per spec.md §4.1's "design permits either —
    /// test for idempotence".
    pub fn reserve_for_peer(&self, peer: &PeerId) -> Result<u16, ReactorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.by_peer.get(peer) {
            return Ok(*existing);
        }

        let id = if let Some(&smallest) = state.free.iter().next() {
            state.free.remove(&smallest);
            smallest
        } else if state.next_unused <= self.cap {
            let id = state.next_unused;
            state.next_unused += 1;
            id
        } else {
            return Err(ReactorError::AllocatorExhausted);
        };

        state.by_peer.insert(peer.clone(), id);
        state.by_id.insert(id, peer.clone());
        Ok(id)
    }

    /// Returns the reserved ID for `peer`, or `0` (`LOCAL_MEMPOOL_ID`) if
    /// none is reserved.
    pub fn get_for_peer(&self, peer: &PeerId) -> u16 {
        let state = self.state.lock().unwrap();
        state.by_peer.get(peer).copied().unwrap_or(LOCAL_MEMPOOL_ID)
    }

    /// Releases `peer`'s ID, if any. Idempotent (spec.md §9 open question:
    /// reclaim must be a no-op when no ID was ever reserved, since
    /// reservation is skipped when broadcast is disabled).
    pub fn reclaim(&self, peer: &PeerId) {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.by_peer.remove(peer) {
            state.by_id.remove(&id);
            state.free.insert(id);
        }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.state.lock().unwrap().by_peer.len()
    }
}
