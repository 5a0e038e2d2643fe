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

//! Lock engine: acquisition and release over the coordination facade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coordination::CoordinationClient;
use crate::error::{CoordinationError, LockError, LockResult};
use crate::holds::{HoldTable, HolderId};
use crate::monitor::{KeyMonitor, MonitorRegistry};

/// Configuration for the lock engine.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Upper bound on a single park while waiting, in milliseconds.
    ///
    /// Waiters re-check the remote node at least this often, which bounds
    /// the cost of a deletion notification that was lost in flight. Timed
    /// waits park for `min(remaining / 2, poll_interval_ms)`.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}

/// Distributed mutual-exclusion API keyed by node path.
///
/// ## Behavior
/// - Mutual exclusion is cross-process: at most one holder owns a key's
///   remote node at a time, enforced by the service's atomic create.
/// - Reentrancy is per holder: the same `HolderId` may re-acquire a key it
///   already holds without a remote round-trip; every other holder runs the
///   full protocol even in the same process.
/// - No fairness: when a node is deleted, all waiters race to recreate it
///   and the service picks one winner.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Block until the lock is held. Never gives up short of a
    /// coordination-service failure.
    async fn lock(&self, holder: &HolderId, key: &str) -> LockResult<()>;

    /// Block until the lock is held or `cancel` fires, whichever comes
    /// first.
    ///
    /// ## Returns
    /// - `Ok(())`: lock held
    /// - `Err(LockError::Interrupted)`: cancelled while waiting; no hold
    ///   recorded
    async fn lock_interruptibly(&self, holder: &HolderId, key: &str, cancel: &CancellationToken) -> LockResult<()>;

    /// Single acquisition attempt. Never waits and never registers a watch.
    async fn try_lock(&self, holder: &HolderId, key: &str) -> LockResult<bool>;

    /// Bounded wait: keep trying until the lock is held or `timeout`
    /// elapses.
    ///
    /// ## Returns
    /// - `Ok(true)`: lock held
    /// - `Ok(false)`: timed out; no hold recorded
    async fn try_lock_for(&self, holder: &HolderId, key: &str, timeout: Duration) -> LockResult<bool>;

    /// Release one hold. The remote node is deleted only when the holder's
    /// count reaches zero.
    ///
    /// ## Returns
    /// - `Err(LockError::NotHeld)`: the holder has no hold on `key`
    async fn unlock(&self, holder: &HolderId, key: &str) -> LockResult<()>;
}

/// Lock engine over a [`CoordinationClient`].
///
/// Drives the create / observe-conflict / watch / park / retry loop and the
/// matching release path. All durable lock state lives in the coordination
/// service; the engine only keeps per-holder counts and per-key wait
/// monitors, both process-local.
pub struct LockService {
    client: Arc<dyn CoordinationClient>,
    holds: HoldTable,
    monitors: MonitorRegistry,
    config: LockConfig,
}

impl LockService {
    /// Create a lock service with the default configuration.
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self::with_config(client, LockConfig::default())
    }

    pub fn with_config(client: Arc<dyn CoordinationClient>, config: LockConfig) -> Self {
        Self {
            client,
            holds: HoldTable::new(),
            monitors: MonitorRegistry::new(),
            config,
        }
    }

    /// Invalidate all local bookkeeping after a session re-establishment.
    ///
    /// Ephemeral nodes created under the lost session are gone, so every
    /// locally-recorded hold is stale. Clears the hold table and wakes all
    /// parked waiters so they re-drive the create loop. Holders must
    /// re-acquire.
    pub async fn reset(&self) {
        self.holds.clear().await;
        self.monitors.notify_all().await;
        warn!("session re-established: hold records invalidated, waiters woken");
    }

    fn validate(key: &str) -> LockResult<()> {
        if key.is_empty() || !key.starts_with('/') {
            return Err(LockError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// The acquisition loop shared by every blocking entry point.
    ///
    /// Returns `Ok(false)` only when `deadline` expires; without a deadline
    /// it loops until the lock is held, cancellation fires, or the service
    /// fails.
    async fn acquire(
        &self,
        holder: &HolderId,
        key: &str,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> LockResult<bool> {
        Self::validate(key)?;
        let monitor = self.monitors.monitor(key).await;

        if self.try_reenter(&monitor, holder, key).await {
            return Ok(true);
        }

        loop {
            match self.client.create_ephemeral(key).await {
                Ok(()) => {
                    let _gate = monitor.gate.lock().await;
                    self.holds.insert(holder, key).await;
                    debug!(key = %key, holder = %holder, "lock acquired");
                    return Ok(true);
                }
                Err(CoordinationError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }

            // Arm the wake-up before computing how long to park: the watch
            // callback pokes this key's monitor.
            let watched = Arc::clone(&monitor);
            match self
                .client
                .watch_for_deletion(key, Box::new(move || watched.deleted.notify_waiters()))
                .await
            {
                Ok(()) => {}
                Err(CoordinationError::NodeNotFound(_)) => {
                    // Node vanished between the failed create and the watch
                    // registration: retry the create without waiting.
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let poll = Duration::from_millis(self.config.poll_interval_ms);
            let park = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!(key = %key, holder = %holder, "lock wait timed out");
                        return Ok(false);
                    }
                    (remaining / 2).min(poll)
                }
                None => poll,
            };

            self.park(&monitor, park, key, cancel).await?;
        }
    }

    /// Reentrant fast path: bump the count if this holder already owns the
    /// key, skipping the remote round-trip.
    async fn try_reenter(&self, monitor: &Arc<KeyMonitor>, holder: &HolderId, key: &str) -> bool {
        let _gate = monitor.gate.lock().await;
        match self.holds.reenter(holder, key).await {
            Some(count) => {
                debug!(key = %key, holder = %holder, count, "reentrant acquisition");
                true
            }
            None => false,
        }
    }

    /// Park until the monitor is poked, the park slice elapses, or `cancel`
    /// fires. Spurious wake-ups are fine — the caller re-checks by retrying
    /// the create.
    async fn park(
        &self,
        monitor: &Arc<KeyMonitor>,
        park: Duration,
        key: &str,
        cancel: Option<&CancellationToken>,
    ) -> LockResult<()> {
        match cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = monitor.deleted.notified() => {}
                    _ = tokio::time::sleep(park) => {}
                    _ = cancel.cancelled() => {
                        debug!(key = %key, "lock wait interrupted");
                        return Err(LockError::Interrupted(key.to_string()));
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = monitor.deleted.notified() => {}
                    _ = tokio::time::sleep(park) => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedLock for LockService {
    async fn lock(&self, holder: &HolderId, key: &str) -> LockResult<()> {
        self.acquire(holder, key, None, None).await.map(|_| ())
    }

    async fn lock_interruptibly(&self, holder: &HolderId, key: &str, cancel: &CancellationToken) -> LockResult<()> {
        self.acquire(holder, key, None, Some(cancel)).await.map(|_| ())
    }

    async fn try_lock(&self, holder: &HolderId, key: &str) -> LockResult<bool> {
        Self::validate(key)?;
        let monitor = self.monitors.monitor(key).await;

        if self.try_reenter(&monitor, holder, key).await {
            return Ok(true);
        }

        match self.client.create_ephemeral(key).await {
            Ok(()) => {
                let _gate = monitor.gate.lock().await;
                self.holds.insert(holder, key).await;
                debug!(key = %key, holder = %holder, "lock acquired");
                Ok(true)
            }
            Err(CoordinationError::NodeExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_lock_for(&self, holder: &HolderId, key: &str, timeout: Duration) -> LockResult<bool> {
        let deadline = Instant::now() + timeout;
        self.acquire(holder, key, Some(deadline), None).await
    }

    async fn unlock(&self, holder: &HolderId, key: &str) -> LockResult<()> {
        Self::validate(key)?;
        let monitor = self.monitors.monitor(key).await;
        let _gate = monitor.gate.lock().await;

        let held = self.holds.count(holder, key).await;
        if held == 0 {
            return Err(LockError::NotHeld {
                key: key.to_string(),
                holder: holder.to_string(),
            });
        }
        if held > 1 {
            let remaining = self.holds.decrement(holder, key).await;
            debug!(key = %key, holder = %holder, remaining, "nested hold released");
            return Ok(());
        }

        // Last hold: delete the remote node first so the hold record never
        // outlives a failed delete, then drop the record.
        match self.client.delete(key).await {
            Ok(()) => {}
            Err(CoordinationError::NodeNotFound(_)) => {
                warn!(key = %key, holder = %holder, "lock node already gone at release");
            }
            Err(e) => return Err(e.into()),
        }
        self.holds.remove(holder, key).await;

        // Watch delivery wakes remote peers; poke the monitor directly so
        // same-process waiters skip the notification round-trip.
        monitor.deleted.notify_waiters();
        debug!(key = %key, holder = %holder, "lock released");
        Ok(())
    }
}

#[cfg(all(test, feature = "memory-backend"))]
mod tests {
    use super::*;
    use crate::memory::MemoryCoordination;

    fn service() -> LockService {
        LockService::new(Arc::new(MemoryCoordination::new()))
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let service = service();
        let holder = HolderId::new("worker-1");

        let result = service.try_lock(&holder, "no-leading-slash").await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));

        let result = service.unlock(&holder, "").await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_try_lock_and_unlock() {
        let service = service();
        let holder = HolderId::new("worker-1");

        assert!(service.try_lock(&holder, "/locks/k").await.unwrap());
        service.unlock(&holder, "/locks/k").await.unwrap();
    }

    #[tokio::test]
    async fn test_unlock_without_hold_is_misuse() {
        let service = service();
        let holder = HolderId::new("worker-1");

        let result = service.unlock(&holder, "/locks/k").await;
        assert!(matches!(result, Err(LockError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn test_misuse_leaves_other_holds_intact() {
        let service = service();
        let a = HolderId::new("worker-a");
        let b = HolderId::new("worker-b");

        assert!(service.try_lock(&a, "/locks/k").await.unwrap());
        assert!(matches!(
            service.unlock(&b, "/locks/k").await,
            Err(LockError::NotHeld { .. })
        ));

        // A's hold survived B's bogus unlock
        service.unlock(&a, "/locks/k").await.unwrap();
    }

    #[tokio::test]
    async fn test_connectivity_error_surfaces() {
        let backend = Arc::new(MemoryCoordination::new());
        let client: Arc<dyn CoordinationClient> = backend.clone();
        let service = LockService::new(client);
        let holder = HolderId::new("worker-1");

        backend.set_connectivity(false).await;
        let result = service.try_lock(&holder, "/locks/k").await;
        assert!(matches!(
            result,
            Err(LockError::Coordination(CoordinationError::Connectivity(_)))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_holds() {
        let service = service();
        let holder = HolderId::new("worker-1");

        assert!(service.try_lock(&holder, "/locks/k").await.unwrap());
        service.reset().await;
        assert!(matches!(
            service.unlock(&holder, "/locks/k").await,
            Err(LockError::NotHeld { .. })
        ));
    }
}
