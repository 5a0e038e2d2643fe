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

//! Error types for distributed lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Result type for coordination-service operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Signals reported by the coordination service.
///
/// `NodeExists` and `NodeNotFound` are protocol signals: the lock engine
/// consumes them internally (conflict and immediate-trigger respectively)
/// and never surfaces them to callers. `Connectivity` is a real failure and
/// always surfaces; retry policy belongs to the client behind the facade,
/// not to the lock engine.
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Node already exists (another session holds the lock)
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// No such node (already deleted or never created)
    #[error("no such node: {0}")]
    NodeNotFound(String),

    /// Connectivity or session-level failure
    #[error("connectivity failure: {0}")]
    Connectivity(String),
}

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock key is empty or not an absolute node path
    #[error("invalid lock key: {0:?}")]
    InvalidKey(String),

    /// Unlock without a matching hold (programming misuse)
    #[error("lock '{key}' is not held by '{holder}'")]
    NotHeld { key: String, holder: String },

    /// Wait cancelled from an interruptible entry point
    #[error("interrupted while waiting for lock '{0}'")]
    Interrupted(String),

    /// Coordination service failure
    #[error("coordination service failure: {0}")]
    Coordination(#[from] CoordinationError),
}
