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

//! Per-key wait monitors with weak-reference reclamation.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, Notify};

/// Rendezvous point for one actively-contended key.
///
/// `deleted` is signalled when the key's remote node is observed deleted
/// (via a watch callback or a same-process release). `gate` serializes the
/// hold-record read-modify-write and the remote-delete decision for the key.
/// Waiters never hold `gate` while parked.
pub(crate) struct KeyMonitor {
    pub(crate) gate: Mutex<()>,
    pub(crate) deleted: Notify,
}

impl KeyMonitor {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            deleted: Notify::new(),
        }
    }
}

/// Maps a lock key to its shared monitor.
///
/// Every task referencing a key observes the same `Arc<KeyMonitor>` — the
/// wake-up path depends on it. Entries are held weakly: once no task
/// references a key's monitor, its entry is dead and gets pruned on the next
/// lookup, so the registry stays bounded by live contention rather than by
/// the set of keys ever seen.
pub(crate) struct MonitorRegistry {
    monitors: Mutex<HashMap<String, Weak<KeyMonitor>>>,
}

impl MonitorRegistry {
    pub(crate) fn new() -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live monitor for `key`, creating one if none exists.
    pub(crate) async fn monitor(&self, key: &str) -> Arc<KeyMonitor> {
        let mut monitors = self.monitors.lock().await;
        if let Some(existing) = monitors.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        monitors.retain(|_, weak| weak.strong_count() > 0);
        let monitor = Arc::new(KeyMonitor::new());
        monitors.insert(key.to_string(), Arc::downgrade(&monitor));
        monitor
    }

    /// Wake every parked waiter on every live monitor.
    pub(crate) async fn notify_all(&self) {
        let monitors = self.monitors.lock().await;
        for weak in monitors.values() {
            if let Some(monitor) = weak.upgrade() {
                monitor.deleted.notify_waiters();
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn live(&self) -> usize {
        let monitors = self.monitors.lock().await;
        monitors.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_same_monitor() {
        let registry = MonitorRegistry::new();
        let a = registry.monitor("/locks/k").await;
        let b = registry.monitor("/locks/k").await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry.monitor("/locks/other").await;
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn test_monitor_reclaimed_when_unreferenced() {
        let registry = MonitorRegistry::new();
        let monitor = registry.monitor("/locks/k").await;
        assert_eq!(registry.live().await, 1);

        drop(monitor);
        assert_eq!(registry.live().await, 0);

        // A later lookup gets a fresh monitor, not a dangling entry
        let fresh = registry.monitor("/locks/k").await;
        assert_eq!(registry.live().await, 1);
        drop(fresh);
    }

    #[tokio::test]
    async fn test_dead_entries_pruned_on_lookup() {
        let registry = MonitorRegistry::new();
        for i in 0..16 {
            let monitor = registry.monitor(&format!("/locks/k{i}")).await;
            drop(monitor);
        }
        // All previous entries are dead; the next lookup sweeps them
        let keeper = registry.monitor("/locks/keeper").await;
        let monitors = registry.monitors.lock().await;
        assert_eq!(monitors.len(), 1);
        drop(monitors);
        drop(keeper);
    }

    #[tokio::test]
    async fn test_notify_all_wakes_parked_waiter() {
        let registry = Arc::new(MonitorRegistry::new());
        let monitor = registry.monitor("/locks/k").await;

        let waiter = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.deleted.notified().await }
        });
        tokio::task::yield_now().await;

        registry.notify_all().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .expect("waiter panicked");
    }
}
