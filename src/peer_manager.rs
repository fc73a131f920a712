// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Peer-manager interface (consumed, spec.md §6): exposes each peer's last
//! known block height, used by the broadcaster's catch-up check.

use crate::peer_id::PeerId;
use std::{collections::HashMap, sync::Mutex};

pub trait PeerHeights: Send + Sync {
    /// `0` means unknown.
    fn get_height(&self, peer: &PeerId) -> u64;
}

/// In-memory implementation. Production deployments back this with the
/// real state-sync/consensus peer-monitoring service; this crate only
/// needs the read side.
#[derive(Default)]
pub struct InMemoryPeerHeights {
    heights: Mutex<HashMap<PeerId, u64>>,
}

impl InMemoryPeerHeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, peer: PeerId, height: u64) {
        self.heights.lock().unwrap().insert(peer, height);
    }
}

impl PeerHeights for InMemoryPeerHeights {
    fn get_height(&self, peer: &PeerId) -> u64 {
        self.heights.lock().unwrap().get(peer).copied().unwrap_or(0)
    }
}
