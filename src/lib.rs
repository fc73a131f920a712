// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Per-peer transaction gossip reactor for a BFT mempool.
//!
//! The reactor admits inbound transactions into a shared, bounded log and
//! runs one broadcaster task per connected peer, each walking the log and
//! forwarding transactions the peer has not already seen. See
//! [`shared_mempool::Reactor`] for the lifecycle entry point.

pub mod config;
pub mod core_mempool;
pub mod counters;
pub mod error;
pub mod logging;
pub mod network;
pub mod panic_hook;
pub mod peer_id;
pub mod peer_manager;
pub mod shared_mempool;

pub use config::{ChannelDescriptor, MempoolConfig};
pub use core_mempool::CoreMempool;
pub use error::{MempoolError, PeerError, ReactorError};
pub use network::{
    InboundEnvelope, MempoolMessage, MempoolNetworkInterface, OutboundEnvelope, PeerErrorReport, PeerStatus,
    PeerUpdate,
};
pub use peer_id::{PeerId, PeerIdAllocator};
pub use peer_manager::{InMemoryPeerHeights, PeerHeights};
pub use shared_mempool::Reactor;
