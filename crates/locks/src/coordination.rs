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

//! Capability trait for the remote coordination service.

use async_trait::async_trait;

use crate::error::CoordinationResult;

/// One-shot notification that a watched node was deleted.
///
/// Invoked at most once per registration, on an arbitrary task.
pub type DeletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Narrow facade over a hierarchical coordination service with ephemeral
/// nodes and deletion notifications (ZooKeeper-like).
///
/// ## Purpose
/// Everything the lock engine needs from the service, and nothing more:
/// atomic create-if-absent, delete, and watch-for-deletion. Connection
/// bootstrap, retry policy, and session lifecycle are owned by the
/// implementation behind this trait — the engine assumes it is handed a
/// connected, live client.
///
/// ## Semantics
/// - The service enforces at-most-one live node per path; a successful
///   `create_ephemeral` means this session owns the node until it is deleted
///   or the session is lost.
/// - `watch_for_deletion` returning `NodeNotFound` means the node is already
///   gone; callers must treat that as an immediate trigger rather than an
///   error.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Atomically create an ephemeral node at `path`, creating intermediate
    /// path segments if absent. The node's lifetime is bound to the client
    /// session.
    ///
    /// ## Returns
    /// - `Ok(())`: node created, this session owns it
    /// - `Err(CoordinationError::NodeExists)`: another session got there first
    /// - `Err(CoordinationError::Connectivity)`: service unreachable
    async fn create_ephemeral(&self, path: &str) -> CoordinationResult<()>;

    /// Delete the node at `path`.
    ///
    /// ## Returns
    /// - `Ok(())`: node deleted
    /// - `Err(CoordinationError::NodeNotFound)`: node already gone
    /// - `Err(CoordinationError::Connectivity)`: service unreachable
    async fn delete(&self, path: &str) -> CoordinationResult<()>;

    /// Register a one-shot callback fired when the node at `path` is
    /// deleted.
    ///
    /// ## Returns
    /// - `Ok(())`: watch registered
    /// - `Err(CoordinationError::NodeNotFound)`: node already gone — treat as
    ///   an immediate trigger
    /// - `Err(CoordinationError::Connectivity)`: service unreachable
    async fn watch_for_deletion(&self, path: &str, callback: DeletionCallback) -> CoordinationResult<()>;
}
