// Copyright © Aptos Foundation
// Parts of the project are originally copyright © Meta Platforms, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Processes directly spawned by the reactor: the receive loop (spec.md
//! §4.2) and the peer-update loop (spec.md §4.3).

use crate::{
    config::MempoolConfig,
    core_mempool::{CoreMempool, SenderInfo},
    counters,
    error::PeerError,
    logging::{LogEntry, LogEvent, LogSchema},
    network::{InboundEnvelope, MempoolMessage, PeerErrorReport, PeerStatus, PeerUpdate},
    panic_hook::{self, PanicObserver},
    peer_id::{PeerIdAllocator, LOCAL_MEMPOOL_ID},
    peer_manager::PeerHeights,
    shared_mempool::{
        broadcaster::{self, BroadcasterHandle},
        types::{Closer, JoinCounter, RoutineMap},
    },
};
use std::sync::{atomic::Ordering, Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// spec.md §4.2: drains the inbound side of the mempool channel, decodes
/// each envelope, and forwards every payload to admission.
pub async fn receive_loop(
    mut inbound: mpsc::Receiver<InboundEnvelope>,
    allocator: Arc<PeerIdAllocator>,
    mempool: Arc<CoreMempool>,
    errors: mpsc::Sender<PeerErrorReport>,
    stop: Arc<Closer>,
    ctx: CancellationToken,
    panic_observer: Arc<dyn PanicObserver>,
) {
    info!("{}", LogSchema::event_log(LogEntry::ReceiveLoop, LogEvent::Start));

    loop {
        let _timer = counters::MAIN_LOOP.start_timer();
        tokio::select! {
            maybe_envelope = inbound.recv() => {
                let Some(envelope) = maybe_envelope else {
                    // End-of-stream: the upstream channel was closed.
                    break;
                };
                handle_envelope(envelope, &allocator, &mempool, &errors, &panic_observer).await;
            }
            _ = stop.closed() => break,
            _ = ctx.cancelled() => break,
        }
    }

    info!("{}", LogSchema::event_log(LogEntry::ReceiveLoop, LogEvent::Terminated));
}

async fn handle_envelope(
    envelope: InboundEnvelope,
    allocator: &Arc<PeerIdAllocator>,
    mempool: &Arc<CoreMempool>,
    errors: &mpsc::Sender<PeerErrorReport>,
    panic_observer: &Arc<dyn PanicObserver>,
) {
    let from = envelope.from.clone();
    let allocator = allocator.clone();
    let mempool = mempool.clone();

    let outcome = panic_hook::guard(panic_observer, "receive_loop", async move {
        process_envelope(envelope, &allocator, &mempool)
    })
    .await;

    let report = match outcome {
        // process_envelope is synchronous; `guard` caught a panic inside it.
        None => Some(PeerError::Panic("panic while processing inbound message".into())),
        Some(Ok(())) => None,
        Some(Err(err)) => Some(err),
    };

    if let Some(error) = report {
        counters::shared_mempool_event_inc("peer_error");
        warn!("{}", LogSchema::event_log(LogEntry::ReceiveLoop, LogEvent::Error).details(&error));
        let _ = errors.send(PeerErrorReport { peer: from, error }).await;
    }
}

fn process_envelope(
    envelope: InboundEnvelope,
    allocator: &PeerIdAllocator,
    mempool: &CoreMempool,
) -> Result<(), PeerError> {
    let sender_id = match &envelope.from {
        Some(peer) => allocator.get_for_peer(peer),
        None => LOCAL_MEMPOOL_ID,
    };

    match envelope.message {
        MempoolMessage::Txs(payloads) if payloads.is_empty() => Err(PeerError::EmptyTxs),
        MempoolMessage::Txs(payloads) => {
            for tx in payloads {
                let sender = SenderInfo { mempool_id: sender_id, height: mempool.height() };
                if let Err(err) = mempool.admit(tx, sender) {
                    // CheckTx rejections are informational; the peer is
                    // never penalized for them (spec.md §4.2 step 3).
                    counters::CHECK_TX_REJECTED.with_label_values(&[err.label()]).inc();
                }
            }
            Ok(())
        }
        MempoolMessage::Unrecognized => Err(PeerError::UnknownVariant),
    }
}

/// spec.md §4.3: consumes `PeerUpdate` events, holding the reactor mutex
/// for the entire handling of one event.
#[allow(clippy::too_many_arguments)]
pub async fn peer_update_loop(
    mut peer_updates: mpsc::Receiver<PeerUpdate>,
    routine_map: Arc<RoutineMap>,
    running: Arc<std::sync::atomic::AtomicBool>,
    stop: Arc<Closer>,
    join_counter: Arc<JoinCounter>,
    allocator: Arc<PeerIdAllocator>,
    mempool: Arc<CoreMempool>,
    peer_heights: Arc<dyn PeerHeights>,
    outbound: mpsc::Sender<crate::network::OutboundEnvelope>,
    config: MempoolConfig,
    ctx: CancellationToken,
    panic_observer: Arc<dyn PanicObserver>,
) {
    info!("{}", LogSchema::event_log(LogEntry::PeerUpdateLoop, LogEvent::Start));

    loop {
        let _timer = counters::MAIN_LOOP.start_timer();
        tokio::select! {
            maybe_update = peer_updates.recv() => {
                let Some(update) = maybe_update else { break };
                handle_peer_update(
                    update,
                    &routine_map,
                    &running,
                    &stop,
                    &join_counter,
                    &allocator,
                    &mempool,
                    &peer_heights,
                    &outbound,
                    &config,
                    &ctx,
                    &panic_observer,
                );
            }
            _ = stop.closed() => break,
            _ = ctx.cancelled() => break,
        }
    }

    info!("{}", LogSchema::event_log(LogEntry::PeerUpdateLoop, LogEvent::Terminated));
}

/// Synchronous by construction: the whole routine-map mutation happens
/// without crossing an `.await`, so holding the map's mutex for "the entire
/// handling of one event" (spec.md §4.3) never blocks another task.
#[allow(clippy::too_many_arguments)]
fn handle_peer_update(
    update: PeerUpdate,
    routine_map: &Arc<RoutineMap>,
    running: &Arc<std::sync::atomic::AtomicBool>,
    stop: &Arc<Closer>,
    join_counter: &Arc<JoinCounter>,
    allocator: &Arc<PeerIdAllocator>,
    mempool: &Arc<CoreMempool>,
    peer_heights: &Arc<dyn PeerHeights>,
    outbound: &mpsc::Sender<crate::network::OutboundEnvelope>,
    config: &MempoolConfig,
    ctx: &CancellationToken,
    panic_observer: &Arc<dyn PanicObserver>,
) {
    let mut map = routine_map.lock().unwrap();

    match update.status {
        PeerStatus::Up => {
            if !running.load(Ordering::Acquire) {
                // Updates may arrive after shutdown has begun.
                return;
            }
            if !config.broadcast {
                return;
            }
            if map.contains_key(&update.peer) {
                return;
            }

            let peer_mempool_id = match allocator.reserve_for_peer(&update.peer) {
                Ok(id) => id,
                Err(err) => {
                    error!(
                        "{}",
                        LogSchema::event_log(LogEntry::Allocator, LogEvent::Error).details(&err)
                    );
                    return;
                }
            };

            let closer = Arc::new(Closer::new());
            map.insert(update.peer.clone(), closer.clone());
            join_counter.increment();
            counters::ACTIVE_BROADCASTERS.inc();
            counters::shared_mempool_event_inc("peer_up");
            info!(
                "{}",
                LogSchema::event_log(LogEntry::PeerUpdateLoop, LogEvent::PeerUp)
                    .peer(hex_prefix(&update.peer))
            );

            let handle = BroadcasterHandle {
                peer: update.peer.clone(),
                peer_mempool_id,
                mempool: mempool.clone(),
                peer_heights: peer_heights.clone(),
                outbound: outbound.clone(),
                closer,
                stop: stop.clone(),
                ctx: ctx.clone(),
                catch_up_interval: std::time::Duration::from_millis(config.catch_up_interval_ms),
                routine_map: routine_map.clone(),
                join_counter: join_counter.clone(),
                panic_observer: panic_observer.clone(),
            };
            tokio::spawn(broadcaster::run(handle));
        }
        PeerStatus::Down => {
            allocator.reclaim(&update.peer);
            counters::shared_mempool_event_inc("peer_down");
            info!(
                "{}",
                LogSchema::event_log(LogEntry::PeerUpdateLoop, LogEvent::PeerDown)
                    .peer(hex_prefix(&update.peer))
            );
            if let Some(closer) = map.get(&update.peer) {
                closer.fire();
            }
        }
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
