// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The per-peer broadcaster: walks the shared transaction log and forwards
//! un-echoed transactions to one peer. This is the algorithmic core named
//! in spec.md §4.4 — the three-state machine (Restart/Evaluate/Advance).

use crate::{
    core_mempool::{CoreMempool, Node},
    counters,
    logging::{LogEntry, LogEvent, LogSchema},
    network::{MempoolMessage, OutboundEnvelope},
    panic_hook::{self, PanicObserver},
    peer_id::PeerId,
    peer_manager::PeerHeights,
    shared_mempool::types::{Closer, JoinCounter, RoutineMap},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cursor state. `None` is spec.md §4.4's "Restart" state (initial, and
/// re-entered whenever a node reports itself detached).
type Cursor = Option<Arc<Node>>;

pub struct BroadcasterHandle {
    pub peer: PeerId,
    pub peer_mempool_id: u16,
    pub mempool: Arc<CoreMempool>,
    pub peer_heights: Arc<dyn PeerHeights>,
    pub outbound: mpsc::Sender<OutboundEnvelope>,
    pub closer: Arc<Closer>,
    pub stop: Arc<Closer>,
    pub ctx: CancellationToken,
    pub catch_up_interval: Duration,
    pub routine_map: Arc<RoutineMap>,
    pub join_counter: Arc<JoinCounter>,
    pub panic_observer: Arc<dyn PanicObserver>,
}

/// Runs until cancelled or closed, then performs termination cleanup
/// regardless of cause (spec.md §4.4 "Termination cleanup").
pub async fn run(handle: BroadcasterHandle) {
    let BroadcasterHandle {
        peer,
        peer_mempool_id,
        mempool,
        peer_heights,
        outbound,
        closer,
        stop,
        ctx,
        catch_up_interval,
        routine_map,
        join_counter,
        panic_observer,
    } = handle;

    panic_hook::guard(&panic_observer, "broadcaster", broadcast_loop(
        peer.clone(),
        peer_mempool_id,
        mempool,
        peer_heights,
        outbound,
        closer,
        stop,
        ctx,
        catch_up_interval,
    ))
    .await;

    routine_map.lock().unwrap().remove(&peer);
    join_counter.decrement();
    counters::ACTIVE_BROADCASTERS.dec();
}

#[allow(clippy::too_many_arguments)]
async fn broadcast_loop(
    peer: PeerId,
    peer_mempool_id: u16,
    mempool: Arc<CoreMempool>,
    peer_heights: Arc<dyn PeerHeights>,
    outbound: mpsc::Sender<OutboundEnvelope>,
    closer: Arc<Closer>,
    stop: Arc<Closer>,
    ctx: CancellationToken,
    catch_up_interval: Duration,
) {
    let mut cursor: Cursor = None;

    loop {
        cursor = match cursor {
            None => match restart(&peer, &mempool, &closer, &stop, &ctx).await {
                Some(node) => Some(node),
                None => return, // cancelled
            },
            Some(node) => {
                if !evaluate(&node, peer_mempool_id, &peer_heights, &peer, &outbound, &closer, &stop, &ctx, catch_up_interval)
                    .await
                {
                    return; // cancelled mid-send
                }
                match advance(&node, &closer, &stop, &ctx).await {
                    AdvanceOutcome::Next(next) => next,
                    AdvanceOutcome::Cancelled => return,
                }
            }
        };
    }
}

/// spec.md §4.4 "Restart": wait for a new transaction, then set the cursor
/// to the log head. Returns `None` only when the wait was cancelled rather
/// than satisfied by a new transaction.
async fn restart(
    peer: &PeerId,
    mempool: &Arc<CoreMempool>,
    closer: &Arc<Closer>,
    stop: &Arc<Closer>,
    ctx: &CancellationToken,
) -> Option<Arc<Node>> {
    loop {
        tokio::select! {
            _ = mempool.wait_for_next_tx() => {}
            _ = closer.closed() => return None,
            _ = stop.closed() => return None,
            _ = ctx.cancelled() => return None,
        }

        match mempool.next_gossip_tx() {
            Some(node) => {
                info!("{}", LogSchema::event_log(LogEntry::Broadcaster, LogEvent::Restarted).peer(PeerDisplay(peer)));
                return Some(node);
            }
            // Racy producer: the log went non-empty and then emptied again
            // (eviction) before we read the head. Re-enter Restart.
            None => continue,
        }
    }
}

/// spec.md §4.4 "Evaluate". Returns `false` if cancelled mid-send, `true`
/// otherwise (sent, skipped, or looped through a catch-up sleep).
#[allow(clippy::too_many_arguments)]
async fn evaluate(
    node: &Arc<Node>,
    peer_mempool_id: u16,
    peer_heights: &Arc<dyn PeerHeights>,
    peer: &PeerId,
    outbound: &mpsc::Sender<OutboundEnvelope>,
    closer: &Arc<Closer>,
    stop: &Arc<Closer>,
    ctx: &CancellationToken,
    catch_up_interval: Duration,
) -> bool {
    loop {
        let peer_height = peer_heights.get_height(peer);
        let tx_height = node.value.height;
        if peer_height > 0 && peer_height < tx_height.saturating_sub(1) {
            counters::CATCH_UP_SLEEPS.inc();
            info!("{}", LogSchema::event_log(LogEntry::Broadcaster, LogEvent::Lagging).peer(PeerDisplay(peer)));
            // Preferred variant per spec.md §9's open question: the sleep
            // is cancellable rather than unconditional.
            tokio::select! {
                _ = tokio::time::sleep(catch_up_interval) => continue,
                _ = closer.closed() => return false,
                _ = stop.closed() => return false,
                _ = ctx.cancelled() => return false,
            }
        }

        if node.value.has_peer(peer_mempool_id) {
            counters::BROADCASTS_SKIPPED.inc();
            info!("{}", LogSchema::event_log(LogEntry::Broadcaster, LogEvent::Skipped).peer(PeerDisplay(peer)));
            return true;
        }

        let envelope = OutboundEnvelope {
            to: peer.clone(),
            message: MempoolMessage::Txs(vec![node.value.tx.clone()]),
        };

        // Past this point we only race the outbound send against the
        // context, not the peer closer — the router owns the send buffer
        // and the send should either complete or be cancelled together
        // with the whole task tree (spec.md §4.4).
        tokio::select! {
            res = outbound.send(envelope) => {
                return match res {
                    Ok(()) => {
                        node.value.mark_known_by(peer_mempool_id);
                        counters::BROADCASTS_SENT.inc();
                        info!("{}", LogSchema::event_log(LogEntry::Broadcaster, LogEvent::Sent).peer(PeerDisplay(peer)));
                        true
                    }
                    Err(_) => false,
                };
            }
            _ = ctx.cancelled() => return false,
        }
    }
}

enum AdvanceOutcome {
    Next(Cursor),
    Cancelled,
}

/// spec.md §4.4 "Advance": wait for the successor or detachment.
async fn advance(
    node: &Arc<Node>,
    closer: &Arc<Closer>,
    stop: &Arc<Closer>,
    ctx: &CancellationToken,
) -> AdvanceOutcome {
    tokio::select! {
        next = node.await_next() => AdvanceOutcome::Next(next),
        _ = closer.closed() => AdvanceOutcome::Cancelled,
        _ = stop.closed() => AdvanceOutcome::Cancelled,
        _ = ctx.cancelled() => AdvanceOutcome::Cancelled,
    }
}

struct PeerDisplay<'a>(&'a PeerId);

impl<'a> std::fmt::Display for PeerDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex_prefix(self.0))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
