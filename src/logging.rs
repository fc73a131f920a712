// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Structured logging schema for the reactor, following the teacher's
//! `LogEntry`/`LogEvent`/`LogSchema` triad: every log line names the
//! subsystem (`LogEntry`), what happened to it (`LogEvent`), and carries
//! whatever structured fields the call site attaches.

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize)]
pub enum LogEntry {
    ReactorRuntime,
    ReceiveLoop,
    PeerUpdateLoop,
    Broadcaster,
    Allocator,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub enum LogEvent {
    Start,
    Terminated,
    PeerUp,
    PeerDown,
    Sent,
    Skipped,
    Lagging,
    Restarted,
    Error,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A structured log line. Call sites build one with [`LogSchema::new`] or
/// [`LogSchema::event_log`], attach fields with the builder methods, then
/// pass it to `tracing`'s `%` display formatting.
#[derive(Debug)]
pub struct LogSchema {
    pub entry: LogEntry,
    pub event: Option<LogEvent>,
    pub peer: Option<String>,
    pub details: Option<String>,
}

impl LogSchema {
    pub fn new(entry: LogEntry) -> Self {
        Self { entry, event: None, peer: None, details: None }
    }

    pub fn event_log(entry: LogEntry, event: LogEvent) -> Self {
        Self { entry, event: Some(event), peer: None, details: None }
    }

    pub fn peer(mut self, peer: impl fmt::Display) -> Self {
        self.peer = Some(peer.to_string());
        self
    }

    pub fn details(mut self, details: impl fmt::Display) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl fmt::Display for LogSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry={}", self.entry)?;
        if let Some(event) = &self.event {
            write!(f, " event={}", event)?;
        }
        if let Some(peer) = &self.peer {
            write!(f, " peer={}", peer)?;
        }
        if let Some(details) = &self.details {
            write!(f, " details={}", details)?;
        }
        Ok(())
    }
}
