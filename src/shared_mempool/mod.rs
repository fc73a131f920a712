// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The reactor: the receive loop, the peer-update loop, and the per-peer
//! broadcasters they spawn (spec.md §4).

pub mod broadcaster;
pub mod coordinator;
pub mod reactor;
pub mod types;

pub use reactor::Reactor;
pub use types::{Closer, JoinCounter, ReactorState, RoutineMap};
