// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 zmutex contributors
//
// This file is part of zmutex.
//
// zmutex is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// zmutex is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with zmutex. If not, see <https://www.gnu.org/licenses/>.

//! # zmutex Distributed Locks
//!
//! ## Purpose
//! Turns a remote hierarchical coordination service (ephemeral nodes plus
//! deletion notifications, ZooKeeper-like) into a process-local lock API
//! usable by concurrent tasks. Acquisition attempts are ordered across local
//! tasks and remote peers without busy-looping, and the same holder can
//! re-enter a lock it already holds.
//!
//! ## Architecture Context
//! The coordination-service client is an external collaborator consumed
//! through the narrow [`CoordinationClient`] capability trait — the engine
//! assumes a connected, live handle and owns none of the session lifecycle.
//!
//! ## Design Decisions
//! - **Service-enforced exclusion**: at most one live node per key; the
//!   atomic create is the only arbiter, so mutual exclusion holds across
//!   processes with zero client-side consensus.
//! - **Ephemeral nodes for crash recovery**: a holder that dies takes its
//!   session — and its node — with it, unblocking everyone else.
//! - **Watch + bounded poll**: waiters park on a per-key monitor and wake on
//!   deletion notifications, with a poll interval (default 50 ms) as the
//!   safety net for notifications lost in flight.
//! - **Per-holder reentrancy**: hold counts are keyed by an explicit
//!   [`HolderId`] token, not implicit thread identity; a key held by one
//!   holder is opaque to every other holder in the same process.
//! - **No fairness**: on release all waiters race to recreate the node and
//!   the service picks one winner.
//!
//! ## Backend Support
//!
//! - **InMemory**: single-process node set with failure injection, for
//!   testing (feature: `memory-backend`)
//! - Real coordination services plug in by implementing
//!   [`CoordinationClient`]
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use zmutex_locks::{DistributedLock, HolderId, LockService};
//! use zmutex_locks::memory::MemoryCoordination;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = LockService::new(Arc::new(MemoryCoordination::new()));
//! let holder = HolderId::new("worker-1");
//!
//! // Blocks until held; reentrant for the same holder
//! service.lock(&holder, "/locks/orders").await?;
//! service.lock(&holder, "/locks/orders").await?;
//!
//! // One unlock per lock; the node is deleted on the last one
//! service.unlock(&holder, "/locks/orders").await?;
//! service.unlock(&holder, "/locks/orders").await?;
//! # Ok(())
//! # }
//! ```

pub mod coordination;
pub mod error;
pub mod holds;
mod monitor;
pub mod service;

#[cfg(feature = "memory-backend")]
pub mod memory;

pub use coordination::{CoordinationClient, DeletionCallback};
pub use error::{CoordinationError, CoordinationResult, LockError, LockResult};
pub use holds::HolderId;
pub use service::{DistributedLock, LockConfig, LockService};
