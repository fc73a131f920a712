// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Configuration recognized by the mempool gossip reactor.

use serde::{Deserialize, Serialize};

/// Options the reactor itself understands. The admission engine's own
/// options pass through opaquely and are not modeled here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// If false, the reactor still admits inbound transactions but never
    /// spawns per-peer broadcasters.
    pub broadcast: bool,
    /// Feeds the channel descriptor's max receive size.
    pub max_tx_bytes: usize,
    /// Maximum number of transactions retained in the shared log before the
    /// oldest is evicted to make room.
    pub mempool_capacity: usize,
    /// How long a broadcaster sleeps when it detects the peer is lagging by
    /// more than one block height (design default: 100 ms).
    pub catch_up_interval_ms: u64,
    /// Ceiling on the peer-ID allocator's active set.
    pub max_active_peers: usize,
    /// Inbound channel buffer depth (spec.md §6: 128 envelopes).
    pub mempool_channel_buffer: usize,
    /// Interval, in ms, at which the peer-update loop polls for membership
    /// changes when driven by a poll-based transport instead of a push
    /// stream. Unused by the push-based `PeerUpdate` channel used here but
    /// kept for parity with the teacher's `shared_mempool_peer_update_interval_ms`.
    pub peer_update_interval_ms: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            broadcast: true,
            max_tx_bytes: 1024 * 1024,
            mempool_capacity: 5_000,
            catch_up_interval_ms: 100,
            max_active_peers: 65_535,
            mempool_channel_buffer: 128,
            peer_update_interval_ms: 1_000,
        }
    }
}

/// Channel priority and sizing, computed from `MempoolConfig`. See
/// spec.md §6 "Channel descriptor".
#[derive(Clone, Copy, Debug)]
pub struct ChannelDescriptor {
    pub priority: u8,
    pub max_receive_size_bytes: usize,
    pub recv_buffer_depth: usize,
}

impl ChannelDescriptor {
    pub fn from_config(config: &MempoolConfig) -> Self {
        Self {
            priority: 5,
            // Serialized size of a Txs message containing a single payload
            // of max_tx_bytes, plus a small fixed overhead for the envelope
            // framing (variant tag + length prefix).
            max_receive_size_bytes: config.max_tx_bytes + 16,
            recv_buffer_depth: config.mempool_channel_buffer,
        }
    }
}
