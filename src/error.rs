// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Error kinds, one per external-interface boundary. See spec.md §7.

use thiserror::Error;

/// Errors attributable to the remote peer. Reported on the channel's error
/// side-band; the transport layer may choose to disconnect the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("txs payload was empty")]
    EmptyTxs,
    #[error("unrecognized message variant")]
    UnknownVariant,
    #[error("panic while processing message: {0}")]
    Panic(String),
}

/// Errors from `CheckTx`. These are logged and suppressed at the reactor;
/// the sending peer is never penalized for them (spec.md §4.2 step 3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already known")]
    AlreadyKnown,
    #[error("transaction exceeds max_tx_bytes ({0} > {1})")]
    TooLarge(usize, usize),
    #[error("transaction payload was empty")]
    Empty,
}

impl MempoolError {
    /// Short, cardinality-safe label for the `CHECK_TX_REJECTED` metric.
    pub fn label(&self) -> &'static str {
        match self {
            MempoolError::AlreadyKnown => "already_known",
            MempoolError::TooLarge(..) => "too_large",
            MempoolError::Empty => "empty",
        }
    }
}

/// Errors surfaced by reactor lifecycle management. These never escape to
/// the process level; callers observe them for diagnostics only.
#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("peer-id allocator exhausted its capacity")]
    AllocatorExhausted,
}
