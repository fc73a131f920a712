// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! End-to-end coverage of the reactor lifecycle against a loopback network,
//! one test per scenario in spec.md §8.

use mempool_reactor::{
    config::MempoolConfig,
    core_mempool::{CoreMempool, SenderInfo},
    network::{test_support::test_network, InboundEnvelope, MempoolMessage, PeerStatus, PeerUpdate},
    panic_hook::PanicObserver,
    peer_id::PeerIdAllocator,
    peer_manager::InMemoryPeerHeights,
    shared_mempool::Reactor,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

fn peer(tag: &str) -> Vec<u8> {
    tag.as_bytes().to_vec()
}

async fn recv_within(rx: &mut tokio::sync::mpsc::Receiver<mempool_reactor::network::OutboundEnvelope>, millis: u64) -> Option<mempool_reactor::network::OutboundEnvelope> {
    tokio::time::timeout(Duration::from_millis(millis), rx.recv()).await.ok().flatten()
}

struct RecordingObserver {
    panics: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self { panics: Mutex::new(Vec::new()) })
    }

    fn count(&self) -> usize {
        self.panics.lock().unwrap().len()
    }
}

impl PanicObserver for RecordingObserver {
    fn observe(&self, context: &str, message: &str) {
        self.panics.lock().unwrap().push(format!("{context}: {message}"));
    }
}

fn start_reactor(
    config: MempoolConfig,
    peer_heights: Arc<InMemoryPeerHeights>,
) -> (Arc<Reactor>, mempool_reactor::network::test_support::TestNetworkHandle, CancellationToken) {
    let mempool = Arc::new(CoreMempool::new(&config));
    let allocator = Arc::new(PeerIdAllocator::new(config.max_active_peers));
    let reactor = Arc::new(Reactor::new(config, mempool, allocator, peer_heights));
    let (network, handle) = test_network(16);
    let ctx = CancellationToken::new();
    reactor.start(ctx.clone(), network);
    (reactor, handle, ctx)
}

#[tokio::test]
async fn single_tx_single_peer() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    peer_heights.set_height(p1.clone(), 10);

    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);
    reactor.mempool().set_height(10);
    reactor
        .mempool()
        .admit(vec![1, 2, 3], SenderInfo { mempool_id: 0, height: 10 })
        .unwrap();

    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();

    let envelope = recv_within(&mut handle.outbound_rx, 500).await.expect("expected one outbound envelope");
    assert_eq!(envelope.to, p1);
    match envelope.message {
        MempoolMessage::Txs(txs) => assert_eq!(txs, vec![vec![1, 2, 3]]),
        other => panic!("unexpected message {other:?}"),
    }

    assert!(
        recv_within(&mut handle.outbound_rx, 100).await.is_none(),
        "at-most-once: the same tx must not be forwarded twice"
    );

    reactor.stop().await;
}

#[tokio::test]
async fn echo_suppression() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    let p2 = peer("p2");
    peer_heights.set_height(p1.clone(), 10);
    peer_heights.set_height(p2.clone(), 10);

    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);

    // p1 connects first so the allocator has an id for it by the time its
    // tx is admitted, then T1 arrives from p1: CheckTx attributes p1 in the
    // sender set.
    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle
        .inbound_tx
        .send(InboundEnvelope { from: Some(p1.clone()), message: MempoolMessage::Txs(vec![vec![9, 9, 9]]) })
        .await
        .unwrap();

    assert!(
        recv_within(&mut handle.outbound_rx, 200).await.is_none(),
        "no self-echo: p1 already has the tx it sent"
    );

    handle.peer_update_tx.send(PeerUpdate { peer: p2.clone(), status: PeerStatus::Up }).await.unwrap();
    let envelope = recv_within(&mut handle.outbound_rx, 500).await.expect("p2 should receive the tx");
    assert_eq!(envelope.to, p2);

    reactor.stop().await;
}

#[tokio::test]
async fn catch_up_lag() {
    let config = MempoolConfig { catch_up_interval_ms: 30, ..Default::default() };
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    peer_heights.set_height(p1.clone(), 5);

    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights.clone());
    reactor.mempool().set_height(10);
    reactor
        .mempool()
        .admit(vec![4, 5, 6], SenderInfo { mempool_id: 0, height: 10 })
        .unwrap();

    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();

    assert!(
        recv_within(&mut handle.outbound_rx, 40).await.is_none(),
        "peer lagging by more than one height must not receive the tx yet"
    );

    peer_heights.set_height(p1.clone(), 9);
    let envelope = recv_within(&mut handle.outbound_rx, 500).await.expect("peer caught up, tx should now be sent");
    assert_eq!(envelope.to, p1);

    reactor.stop().await;
}

#[tokio::test]
async fn peer_down_mid_broadcast() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    // No height recorded and no tx admitted: the broadcaster parks in
    // Restart, waiting for a transaction that never arrives until we bring
    // the peer down.
    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);

    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let allocator = reactor.allocator();
    assert_eq!(allocator.get_for_peer(&p1), 1, "peer should have a reserved mempool id while connected");

    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Down }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        allocator.get_for_peer(&p1),
        mempool_reactor::peer_id::LOCAL_MEMPOOL_ID,
        "mempool id must be reclaimed once the peer goes down"
    );

    reactor.stop().await;
}

/// spec.md §8 "Liveness under detachment": the broadcaster is parked in
/// Advance on a node that then gets evicted out from under it (the shared
/// log is bounded); it must resume forwarding the next admitted tx within a
/// bounded number of steps rather than getting stuck.
#[tokio::test]
async fn liveness_under_detachment() {
    let config = MempoolConfig { mempool_capacity: 1, ..Default::default() };
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    peer_heights.set_height(p1.clone(), 10);

    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);
    reactor.mempool().set_height(10);
    reactor
        .mempool()
        .admit(vec![1], SenderInfo { mempool_id: 0, height: 10 })
        .unwrap();

    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();

    let first = recv_within(&mut handle.outbound_rx, 500).await.expect("first tx should be forwarded");
    match first.message {
        MempoolMessage::Txs(txs) => assert_eq!(txs, vec![vec![1]]),
        other => panic!("unexpected message {other:?}"),
    }

    // The broadcaster is now parked in Advance, waiting on the first node's
    // successor. `mempool_capacity: 1` means admitting a second tx evicts
    // (detaches) the first node the cursor is camped on.
    reactor
        .mempool()
        .admit(vec![2], SenderInfo { mempool_id: 0, height: 10 })
        .unwrap();

    let second = recv_within(&mut handle.outbound_rx, 500)
        .await
        .expect("broadcaster must resume forwarding after its cursor is detached");
    match second.message {
        MempoolMessage::Txs(txs) => assert_eq!(txs, vec![vec![2]]),
        other => panic!("unexpected message {other:?}"),
    }

    reactor.stop().await;
}

#[tokio::test]
async fn malformed_inbound_is_reported_and_receive_loop_survives() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);
    let p1 = peer("p1");

    handle
        .inbound_tx
        .send(InboundEnvelope { from: Some(p1.clone()), message: MempoolMessage::Txs(vec![]) })
        .await
        .unwrap();

    let report = tokio::time::timeout(Duration::from_millis(200), handle.error_rx.recv())
        .await
        .expect("error side-band should fire")
        .expect("channel open");
    assert_eq!(report.peer, Some(p1.clone()));
    assert_eq!(reactor.mempool().len(), 0, "no transaction should have entered admission");

    // The receive loop must still be alive for a subsequent valid envelope.
    handle
        .inbound_tx
        .send(InboundEnvelope { from: Some(p1), message: MempoolMessage::Txs(vec![vec![1]]) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reactor.mempool().len(), 1);

    reactor.stop().await;
}

/// The panic-recovery half of spec.md §8 scenario 6 (exactly-once
/// observation, no propagation) is covered at the unit level in
/// `panic_hook`'s own tests, since no payload in this crate's current
/// surface actually panics a handler. This test covers the other half: an
/// error-side-band report for a rejected envelope, and receive-loop
/// survival into the next one.
#[tokio::test]
async fn unrecognized_message_is_reported_and_receive_loop_survives() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let mempool = Arc::new(CoreMempool::new(&config));
    let allocator = Arc::new(PeerIdAllocator::new(config.max_active_peers));
    let observer = RecordingObserver::new();
    let reactor = Arc::new(Reactor::with_panic_observer(
        config,
        mempool,
        allocator,
        peer_heights,
        observer.clone(),
    ));
    let (network, mut handle) = test_network(16);
    let ctx = CancellationToken::new();
    reactor.start(ctx, network);

    let p1 = peer("p1");
    // Unrecognized is always a clean rejection today (no handler panics on
    // any current payload shape); this exercises the same error side-band
    // and receive-loop-survives path that a future panicking handler would.
    handle
        .inbound_tx
        .send(InboundEnvelope { from: Some(p1.clone()), message: MempoolMessage::Unrecognized })
        .await
        .unwrap();

    let report = tokio::time::timeout(Duration::from_millis(200), handle.error_rx.recv())
        .await
        .expect("error side-band should fire")
        .expect("channel open");
    assert_eq!(report.peer, Some(p1.clone()));

    handle
        .inbound_tx
        .send(InboundEnvelope { from: Some(p1), message: MempoolMessage::Txs(vec![vec![7]]) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reactor.mempool().len(), 1, "receive loop must process a subsequent valid envelope");
    assert_eq!(observer.count(), 0, "no handler in this crate's current surface panics");

    reactor.stop().await;
}

#[tokio::test]
async fn graceful_shutdown_drains_routine_map_and_join_counter() {
    let config = MempoolConfig::default();
    let peer_heights = Arc::new(InMemoryPeerHeights::new());
    let p1 = peer("p1");
    let p2 = peer("p2");
    peer_heights.set_height(p1.clone(), 1);
    peer_heights.set_height(p2.clone(), 1);

    let (reactor, mut handle, _ctx) = start_reactor(config, peer_heights);
    handle.peer_update_tx.send(PeerUpdate { peer: p1.clone(), status: PeerStatus::Up }).await.unwrap();
    handle.peer_update_tx.send(PeerUpdate { peer: p2.clone(), status: PeerStatus::Up }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Stop() must return only once every broadcaster has exited through its
    // own path (spec.md §8 "Graceful shutdown").
    tokio::time::timeout(Duration::from_secs(2), reactor.stop())
        .await
        .expect("stop() must not hang");

    assert_eq!(reactor.routine_map_len(), 0);
    assert_eq!(reactor.join_counter_count(), 0);
}
