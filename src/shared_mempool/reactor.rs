// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The reactor lifecycle: `start` spawns the receive loop and the
//! peer-update loop; `stop` unwinds them in the order spec.md §4.5 requires.

use crate::{
    config::MempoolConfig,
    core_mempool::CoreMempool,
    logging::{LogEntry, LogEvent, LogSchema},
    network::MempoolNetworkInterface,
    panic_hook::{noop_observer, PanicObserver},
    peer_id::PeerIdAllocator,
    peer_manager::PeerHeights,
    shared_mempool::{coordinator, types::ReactorState},
};
use std::sync::{atomic::Ordering, Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct RunningHandles {
    receive_loop: JoinHandle<()>,
    peer_update_loop: JoinHandle<()>,
}

/// Owns the reactor state and the two top-level tasks. `Reactor` itself is
/// `Sync`: `start`/`stop` take `&self` and serialize through `handles`.
pub struct Reactor {
    config: MempoolConfig,
    mempool: Arc<CoreMempool>,
    allocator: Arc<PeerIdAllocator>,
    peer_heights: Arc<dyn PeerHeights>,
    panic_observer: Arc<dyn PanicObserver>,
    state: Arc<ReactorState>,
    handles: Mutex<Option<RunningHandles>>,
}

impl Reactor {
    pub fn new(
        config: MempoolConfig,
        mempool: Arc<CoreMempool>,
        allocator: Arc<PeerIdAllocator>,
        peer_heights: Arc<dyn PeerHeights>,
    ) -> Self {
        Self::with_panic_observer(config, mempool, allocator, peer_heights, noop_observer())
    }

    pub fn with_panic_observer(
        config: MempoolConfig,
        mempool: Arc<CoreMempool>,
        allocator: Arc<PeerIdAllocator>,
        peer_heights: Arc<dyn PeerHeights>,
        panic_observer: Arc<dyn PanicObserver>,
    ) -> Self {
        Self {
            config,
            mempool,
            allocator,
            peer_heights,
            panic_observer,
            state: Arc::new(ReactorState::new()),
            handles: Mutex::new(None),
        }
    }

    /// Spawns the receive loop and the peer-update loop (spec.md §4.5
    /// "Start"). `ctx` is owned by the caller, not the reactor; it is one of
    /// the four cancellation sources every suspension point observes. If
    /// `config.broadcast` is false, inbound transactions are still admitted,
    /// but `peer_update_loop` will never spawn a broadcaster — it checks the
    /// same flag on every `PeerUp` event.
    pub fn start(&self, ctx: CancellationToken, network: MempoolNetworkInterface) {
        self.state.running.store(true, Ordering::Release);
        if !self.config.broadcast {
            info!(
                "{}",
                LogSchema::event_log(LogEntry::ReactorRuntime, LogEvent::Start)
                    .details("broadcast disabled; receive loop only")
            );
        } else {
            info!("{}", LogSchema::event_log(LogEntry::ReactorRuntime, LogEvent::Start));
        }

        let receive_loop = tokio::spawn(coordinator::receive_loop(
            network.inbound,
            self.allocator.clone(),
            self.mempool.clone(),
            network.errors,
            self.state.stop.clone(),
            ctx.clone(),
            self.panic_observer.clone(),
        ));

        let peer_update_loop = tokio::spawn(coordinator::peer_update_loop(
            network.peer_updates,
            self.state.routine_map.clone(),
            self.state.running.clone(),
            self.state.stop.clone(),
            self.state.join_counter.clone(),
            self.allocator.clone(),
            self.mempool.clone(),
            self.peer_heights.clone(),
            network.outbound,
            self.config.clone(),
            ctx,
            self.panic_observer.clone(),
        ));

        *self.handles.lock().unwrap() = Some(RunningHandles { receive_loop, peer_update_loop });
    }

    /// Unwinds the reactor (spec.md §4.5 "Stop"). The order is load-bearing:
    /// `running` is cleared first so any `PeerUp` racing with shutdown is
    /// rejected; every live broadcaster's closer fires before the mutex is
    /// released; only once all of them have exited (`join_counter` at zero)
    /// does the process-wide `stop` signal fire, which is what lets the
    /// receive loop and the peer-update loop themselves return.
    pub async fn stop(&self) {
        self.state.running.store(false, Ordering::Release);

        {
            let map = self.state.routine_map.lock().unwrap();
            for closer in map.values() {
                closer.fire();
            }
        }

        self.state.join_counter.wait_zero().await;
        self.state.stop.fire();

        let handles = self.handles.lock().unwrap().take();
        if let Some(handles) = handles {
            let _ = handles.receive_loop.await;
            let _ = handles.peer_update_loop.await;
        }

        info!("{}", LogSchema::event_log(LogEntry::ReactorRuntime, LogEvent::Terminated));
    }

    pub fn mempool(&self) -> Arc<CoreMempool> {
        self.mempool.clone()
    }

    pub fn allocator(&self) -> Arc<PeerIdAllocator> {
        self.allocator.clone()
    }

    /// Exposes the two quantities spec.md §8's "Graceful shutdown" property
    /// is stated over. Not needed by production callers; kept behind the
    /// same test-support convention as [`crate::network::test_support`].
    #[cfg(any(test, feature = "test-support"))]
    pub fn routine_map_len(&self) -> usize {
        self.state.routine_map.lock().unwrap().len()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn join_counter_count(&self) -> usize {
        self.state.join_counter.count()
    }
}
