// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Shared reactor state: the routine map, the one-shot closer primitive,
//! and the broadcaster join counter (spec.md §3 "Reactor state").

use crate::peer_id::PeerId;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::Notify;

/// A one-shot cancellation signal. Fired at most once; `closed()` may be
/// awaited any number of times, by any number of tasks, before or after
/// firing (spec.md §3 "Closer").
#[derive(Default)]
pub struct Closer {
    fired: AtomicBool,
    notify: Notify,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.fired.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Tracks how many broadcaster tasks are currently live, so `Stop()` can
/// wait for all of them to exit (spec.md §4.5).
#[derive(Default)]
pub struct JoinCounter {
    count: AtomicUsize,
    notify: Notify,
}

impl JoinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement(&self) {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub async fn wait_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One entry per live broadcaster, guarded by a single mutex held only for
/// O(1) insert/lookup/delete, never across I/O (spec.md §5 "Shared
/// resources").
pub type RoutineMap = Mutex<HashMap<PeerId, Arc<Closer>>>;

pub fn new_routine_map() -> Arc<RoutineMap> {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Process-wide reactor state: the routine map, the stop signal, and the
/// broadcaster join counter (spec.md §3 "Reactor state"). Every field is
/// individually `Arc`-shared because `Start` hands clones of each one to two
/// independently spawned tasks (the receive loop and the peer-update loop).
pub struct ReactorState {
    pub routine_map: Arc<RoutineMap>,
    pub stop: Arc<Closer>,
    pub join_counter: Arc<JoinCounter>,
    pub running: Arc<AtomicBool>,
}

impl ReactorState {
    pub fn new() -> Self {
        Self {
            routine_map: new_routine_map(),
            stop: Arc::new(Closer::new()),
            join_counter: Arc::new(JoinCounter::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ReactorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closer_wakes_waiters_registered_before_fire() {
        let closer = std::sync::Arc::new(Closer::new());
        let waiter = {
            let closer = closer.clone();
            tokio::spawn(async move { closer.closed().await })
        };
        tokio::task::yield_now().await;
        closer.fire();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn closed_returns_immediately_if_already_fired() {
        let closer = Closer::new();
        closer.fire();
        closer.closed().await;
    }

    #[tokio::test]
    async fn join_counter_wait_zero_unblocks_at_zero() {
        let counter = std::sync::Arc::new(JoinCounter::new());
        counter.increment();
        counter.increment();
        let waiter = {
            let counter = counter.clone();
            tokio::spawn(async move { counter.wait_zero().await })
        };
        tokio::task::yield_now().await;
        counter.decrement();
        counter.decrement();
        waiter.await.unwrap();
    }
}
