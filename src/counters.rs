// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the reactor, mirroring the shape of the teacher's
//! `counters` module (a `MAIN_LOOP` timer, a generic event-kind counter, and
//! per-peer broadcast counters).

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

pub static MAIN_LOOP: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "mempool_reactor_main_loop_seconds",
        "Time spent per iteration of the receive/peer-update select loop"
    )
    .unwrap()
});

pub static SHARED_MEMPOOL_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mempool_reactor_events_total",
        "Count of reactor-level events by kind",
        &["kind"]
    )
    .unwrap()
});

pub static BROADCASTS_SENT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mempool_reactor_broadcasts_sent_total",
        "Number of transactions forwarded to a peer"
    )
    .unwrap()
});

pub static BROADCASTS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mempool_reactor_broadcasts_skipped_total",
        "Number of transactions skipped because the peer already had them"
    )
    .unwrap()
});

pub static CATCH_UP_SLEEPS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mempool_reactor_catch_up_sleeps_total",
        "Number of times a broadcaster slept waiting for a lagging peer"
    )
    .unwrap()
});

pub static ACTIVE_BROADCASTERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "mempool_reactor_active_broadcasters",
        "Number of currently running per-peer broadcaster tasks"
    )
    .unwrap()
});

pub static CHECK_TX_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mempool_reactor_check_tx_rejected_total",
        "CheckTx rejections by reason",
        &["reason"]
    )
    .unwrap()
});

pub fn shared_mempool_event_inc(kind: &str) {
    SHARED_MEMPOOL_EVENTS.with_label_values(&[kind]).inc();
}
