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

//! In-memory coordination backend (for testing).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::coordination::{CoordinationClient, DeletionCallback};
use crate::error::{CoordinationError, CoordinationResult};

struct MemoryState {
    nodes: HashSet<String>,
    watches: Vec<(String, DeletionCallback)>,
    connected: bool,
    deliver_watches: bool,
}

/// In-memory coordination service (for testing).
///
/// ## Purpose
/// Single-process stand-in for a real coordination client: atomic
/// create-if-absent over a node set, deletion watches fired synchronously on
/// delete.
///
/// ## Failure injection
/// - [`set_connectivity`](Self::set_connectivity): when down, every
///   operation fails with `Connectivity`.
/// - [`set_watch_delivery`](Self::set_watch_delivery): when off,
///   registrations succeed but callbacks are silently dropped, simulating
///   notifications lost in flight.
/// - [`expire_session`](Self::expire_session): removes every node and fires
///   all pending watches, the way a real service reaps ephemeral nodes when
///   their session dies.
///
/// ## Limitations
/// - Single process only; all "sessions" share one lifetime
/// - No hierarchy bookkeeping: parent segments are implicit
#[derive(Clone)]
pub struct MemoryCoordination {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCoordination {
    /// Create a new in-memory coordination backend.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                nodes: HashSet::new(),
                watches: Vec::new(),
                connected: true,
                deliver_watches: true,
            })),
        }
    }

    /// Whether a node currently exists at `path`.
    pub async fn exists(&self, path: &str) -> bool {
        self.state.lock().await.nodes.contains(path)
    }

    /// Toggle connectivity. While down, every operation returns
    /// `CoordinationError::Connectivity`.
    pub async fn set_connectivity(&self, up: bool) {
        self.state.lock().await.connected = up;
    }

    /// Toggle watch delivery. While off, watch registrations succeed but the
    /// callbacks are never invoked.
    pub async fn set_watch_delivery(&self, on: bool) {
        self.state.lock().await.deliver_watches = on;
    }

    /// Drop every node and fire all pending watches, as the service does
    /// when the owning session is lost.
    pub async fn expire_session(&self) {
        let fired = {
            let mut state = self.state.lock().await;
            state.nodes.clear();
            std::mem::take(&mut state.watches)
        };
        for (_, callback) in fired {
            callback();
        }
    }

    /// Detach the watches registered for `path`. Callbacks are invoked after
    /// the state lock is released.
    fn drain_watches(state: &mut MemoryState, path: &str) -> Vec<DeletionCallback> {
        let mut fired = Vec::new();
        let mut remaining = Vec::new();
        for (watched, callback) in state.watches.drain(..) {
            if watched == path {
                fired.push(callback);
            } else {
                remaining.push((watched, callback));
            }
        }
        state.watches = remaining;
        fired
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordination {
    async fn create_ephemeral(&self, path: &str) -> CoordinationResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(CoordinationError::Connectivity("backend offline".to_string()));
        }
        if state.nodes.contains(path) {
            return Err(CoordinationError::NodeExists(path.to_string()));
        }
        state.nodes.insert(path.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> CoordinationResult<()> {
        let fired = {
            let mut state = self.state.lock().await;
            if !state.connected {
                return Err(CoordinationError::Connectivity("backend offline".to_string()));
            }
            if !state.nodes.remove(path) {
                return Err(CoordinationError::NodeNotFound(path.to_string()));
            }
            Self::drain_watches(&mut state, path)
        };
        // Invoke outside the lock; callbacks may poke monitors immediately
        for callback in fired {
            callback();
        }
        Ok(())
    }

    async fn watch_for_deletion(&self, path: &str, callback: DeletionCallback) -> CoordinationResult<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(CoordinationError::Connectivity("backend offline".to_string()));
        }
        if !state.nodes.contains(path) {
            return Err(CoordinationError::NodeNotFound(path.to_string()));
        }
        if state.deliver_watches {
            state.watches.push((path.to_string(), callback));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let backend = MemoryCoordination::new();

        backend.create_ephemeral("/locks/k").await.unwrap();
        let result = backend.create_ephemeral("/locks/k").await;
        assert!(matches!(result, Err(CoordinationError::NodeExists(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_node() {
        let backend = MemoryCoordination::new();

        let result = backend.delete("/locks/k").await;
        assert!(matches!(result, Err(CoordinationError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_watch_fires_on_delete() {
        let backend = MemoryCoordination::new();
        let fired = Arc::new(AtomicUsize::new(0));

        backend.create_ephemeral("/locks/k").await.unwrap();
        let counter = Arc::clone(&fired);
        backend
            .watch_for_deletion("/locks/k", Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        backend.delete("/locks/k").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!backend.exists("/locks/k").await);
    }

    #[tokio::test]
    async fn test_watch_on_missing_node_is_immediate_trigger() {
        let backend = MemoryCoordination::new();

        let result = backend.watch_for_deletion("/locks/k", Box::new(|| {})).await;
        assert!(matches!(result, Err(CoordinationError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_watch_scoped_to_path() {
        let backend = MemoryCoordination::new();
        let fired = Arc::new(AtomicUsize::new(0));

        backend.create_ephemeral("/locks/a").await.unwrap();
        backend.create_ephemeral("/locks/b").await.unwrap();
        let counter = Arc::clone(&fired);
        backend
            .watch_for_deletion("/locks/a", Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        backend.delete("/locks/b").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        backend.delete("/locks/a").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connectivity_failure_injection() {
        let backend = MemoryCoordination::new();
        backend.set_connectivity(false).await;

        assert!(matches!(
            backend.create_ephemeral("/locks/k").await,
            Err(CoordinationError::Connectivity(_))
        ));
        assert!(matches!(
            backend.delete("/locks/k").await,
            Err(CoordinationError::Connectivity(_))
        ));
        assert!(matches!(
            backend.watch_for_deletion("/locks/k", Box::new(|| {})).await,
            Err(CoordinationError::Connectivity(_))
        ));

        backend.set_connectivity(true).await;
        backend.create_ephemeral("/locks/k").await.unwrap();
    }

    #[tokio::test]
    async fn test_suppressed_watch_never_fires() {
        let backend = MemoryCoordination::new();
        let fired = Arc::new(AtomicUsize::new(0));

        backend.create_ephemeral("/locks/k").await.unwrap();
        backend.set_watch_delivery(false).await;
        let counter = Arc::clone(&fired);
        backend
            .watch_for_deletion("/locks/k", Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        backend.delete("/locks/k").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expire_session_reaps_nodes_and_fires_watches() {
        let backend = MemoryCoordination::new();
        let fired = Arc::new(AtomicUsize::new(0));

        backend.create_ephemeral("/locks/a").await.unwrap();
        backend.create_ephemeral("/locks/b").await.unwrap();
        let counter = Arc::clone(&fired);
        backend
            .watch_for_deletion("/locks/a", Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        backend.expire_session().await;
        assert!(!backend.exists("/locks/a").await);
        assert!(!backend.exists("/locks/b").await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
