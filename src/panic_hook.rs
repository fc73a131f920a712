// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Panic isolation. Each long-lived task has its own panic barrier that
//! converts a panic into a clean exit plus an observation callback,
//! per spec.md §7/§9. The hook defaults to a no-op so tests can swap in an
//! assertion that no panic occurred.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures::FutureExt;

/// Invoked with a human-readable description of the panic whenever a
/// guarded task's body panics.
pub trait PanicObserver: Send + Sync {
    fn observe(&self, context: &str, message: &str);
}

pub struct NoopPanicObserver;

impl PanicObserver for NoopPanicObserver {
    fn observe(&self, _context: &str, _message: &str) {}
}

pub fn noop_observer() -> Arc<dyn PanicObserver> {
    Arc::new(NoopPanicObserver)
}

/// Runs `fut` to completion, recovering any panic, observing it via
/// `observer`, and returning `None` in that case instead of propagating.
pub async fn guard<F, T>(observer: &Arc<dyn PanicObserver>, context: &str, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_message(&payload);
            observer.observe(context, &message);
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
