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

//! Per-holder reentrancy bookkeeping.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::Mutex;

/// Identity token for a lock holder.
///
/// Replaces implicit thread identity: each logical holder (a worker task, a
/// request pipeline, a test fixture) carries its own token, and reentrancy
/// is scoped to it. Two holders in the same process never share holds — the
/// second always runs the full remote protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderId(String);

impl HolderId {
    /// Create a holder identity from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HolderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for HolderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Hold counts per (holder, key).
///
/// A non-zero count for (holder, key) exists iff that holder currently owns
/// the remote node for the key. Callers serialize mutations for a single key
/// through the key's monitor gate; the mutex here only protects the map
/// itself.
pub(crate) struct HoldTable {
    counts: Mutex<HashMap<HolderId, HashMap<String, u32>>>,
}

impl HoldTable {
    pub(crate) fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Increment an existing hold. Returns the new count, or `None` if the
    /// holder has no hold on the key (the caller must run the remote
    /// protocol).
    pub(crate) async fn reenter(&self, holder: &HolderId, key: &str) -> Option<u32> {
        let mut counts = self.counts.lock().await;
        let count = counts.get_mut(holder)?.get_mut(key)?;
        *count += 1;
        Some(*count)
    }

    /// Record a fresh hold with count 1.
    pub(crate) async fn insert(&self, holder: &HolderId, key: &str) {
        let mut counts = self.counts.lock().await;
        counts
            .entry(holder.clone())
            .or_default()
            .insert(key.to_string(), 1);
    }

    /// Current hold count, 0 if absent.
    pub(crate) async fn count(&self, holder: &HolderId, key: &str) -> u32 {
        let counts = self.counts.lock().await;
        counts
            .get(holder)
            .and_then(|keys| keys.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Decrement a nested hold. Returns the remaining count.
    pub(crate) async fn decrement(&self, holder: &HolderId, key: &str) -> u32 {
        let mut counts = self.counts.lock().await;
        match counts.get_mut(holder).and_then(|keys| keys.get_mut(key)) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        }
    }

    /// Drop the hold record entirely (count reached zero).
    pub(crate) async fn remove(&self, holder: &HolderId, key: &str) {
        let mut counts = self.counts.lock().await;
        if let Some(keys) = counts.get_mut(holder) {
            keys.remove(key);
            if keys.is_empty() {
                counts.remove(holder);
            }
        }
    }

    /// Drop every hold record. Used when the coordination session has been
    /// re-established and all ephemeral nodes are gone.
    pub(crate) async fn clear(&self) {
        self.counts.lock().await.clear();
    }
}
