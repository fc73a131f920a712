// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! P2P channel interface (consumed, spec.md §6): typed send/receive
//! envelopes and peer-status updates. The transport itself, and the wire
//! encoding beneath `MempoolMessage`, are out of scope; this module fixes
//! only the shapes the reactor depends on.

use crate::peer_id::PeerId;
use serde::{Deserialize, Serialize};

/// The one message variant currently defined (spec.md §4.2, §6). Batching
/// multiple transactions into one `Txs` was disabled by design "owing to a
/// prior correctness bug" (spec.md §6) — implementers must not reintroduce
/// it without redesigning sender-set attribution, so the broadcaster only
/// ever constructs a single-element `Txs`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MempoolMessage {
    Txs(Vec<Vec<u8>>),
    /// Reserved for a future message kind. The broadcaster never
    /// constructs this variant; its only current purpose is exercising the
    /// "unrecognized message variant" rejection path (spec.md §4.2 step 1).
    Unrecognized,
}

/// An inbound envelope. `from` is `None` for a locally injected message.
#[derive(Clone, Debug)]
pub struct InboundEnvelope {
    pub from: Option<PeerId>,
    pub message: MempoolMessage,
}

/// An outbound envelope addressed to a single peer.
#[derive(Clone, Debug)]
pub struct OutboundEnvelope {
    pub to: PeerId,
    pub message: MempoolMessage,
}

/// Reported on the channel's error side-band (spec.md §6).
#[derive(Clone, Debug)]
pub struct PeerErrorReport {
    pub peer: Option<PeerId>,
    pub error: crate::error::PeerError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerStatus {
    Up,
    Down,
}

#[derive(Clone, Debug)]
pub struct PeerUpdate {
    pub peer: PeerId,
    pub status: PeerStatus,
}

/// The inbound/outbound/error-side-band triad the reactor consumes. Kept as
/// a bundle of channel endpoints rather than a trait object, following the
/// teacher's preference for concrete `mpsc`/`NetworkClient` types over
/// dynamic dispatch at the transport seam.
pub struct MempoolNetworkInterface {
    pub inbound: tokio::sync::mpsc::Receiver<InboundEnvelope>,
    pub outbound: tokio::sync::mpsc::Sender<OutboundEnvelope>,
    pub errors: tokio::sync::mpsc::Sender<PeerErrorReport>,
    pub peer_updates: tokio::sync::mpsc::Receiver<PeerUpdate>,
}

/// A loopback pair used only by tests, standing in for a real transport.
/// Grounded on the teacher's split between `NetworkClient` (send side) and
/// `NetworkServiceEvents` (receive side) but backed by channels instead of
/// a socket (SPEC_FULL.md §10).
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use tokio::sync::mpsc;

    pub struct TestNetworkHandle {
        pub inbound_tx: mpsc::Sender<InboundEnvelope>,
        pub peer_update_tx: mpsc::Sender<PeerUpdate>,
        pub outbound_rx: mpsc::Receiver<OutboundEnvelope>,
        pub error_rx: mpsc::Receiver<PeerErrorReport>,
    }

    pub fn test_network(buffer: usize) -> (MempoolNetworkInterface, TestNetworkHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
        let (error_tx, error_rx) = mpsc::channel(buffer);
        let (peer_update_tx, peer_update_rx) = mpsc::channel(buffer);

        (
            MempoolNetworkInterface {
                inbound: inbound_rx,
                outbound: outbound_tx,
                errors: error_tx,
                peer_updates: peer_update_rx,
            },
            TestNetworkHandle { inbound_tx, peer_update_tx, outbound_rx, error_rx },
        )
    }
}
