//! In-memory sync status.
//!
//! One status record exists per coordinator. It is diagnostic state for the
//! UI: every field is last-write-wins and callers only ever get copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Snapshot of the sync subsystem handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// A manual pull is in flight.
    pub is_syncing: bool,
    /// Last successful push, pull or applied remote change.
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Envelope writes currently in flight.
    pub pending_changes: u32,
}

/// Owner of the live status record.
#[derive(Debug, Default)]
pub struct SyncStatusTracker {
    status: Mutex<SyncStatus>,
}

impl SyncStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current status.
    pub fn snapshot(&self) -> SyncStatus {
        self.lock().clone()
    }

    /// Marks a manual sync as started.
    ///
    /// Returns `None` if one is already running. The returned guard clears
    /// `is_syncing` when dropped, whatever the outcome of the sync.
    pub fn try_begin_sync(self: &Arc<Self>) -> Option<SyncingGuard> {
        let mut status = self.lock();
        if status.is_syncing {
            return None;
        }
        status.is_syncing = true;
        Some(SyncingGuard {
            tracker: Arc::clone(self),
        })
    }

    /// Counts an envelope write as pending until the guard is dropped.
    pub fn begin_pending(self: &Arc<Self>) -> PendingChangeGuard {
        self.lock().pending_changes += 1;
        PendingChangeGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Records a successful operation: bumps the sync time and clears the error.
    pub fn record_success(&self) {
        let mut status = self.lock();
        status.last_sync_time = Some(Self::next_sync_time(status.last_sync_time));
        status.last_error = None;
    }

    /// Bumps the sync time without touching the last error.
    pub fn record_sync_time(&self) {
        let mut status = self.lock();
        status.last_sync_time = Some(Self::next_sync_time(status.last_sync_time));
    }

    pub fn record_error(&self, error: impl ToString) {
        self.lock().last_error = Some(error.to_string());
    }

    // Wall clocks can step backwards; the reported time never does.
    fn next_sync_time(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match previous {
            Some(previous) if previous > now => previous,
            _ => now,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_syncing` on drop.
#[derive(Debug)]
pub struct SyncingGuard {
    tracker: Arc<SyncStatusTracker>,
}

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        self.tracker.lock().is_syncing = false;
    }
}

/// Decrements `pending_changes` on drop.
#[derive(Debug)]
pub struct PendingChangeGuard {
    tracker: Arc<SyncStatusTracker>,
}

impl Drop for PendingChangeGuard {
    fn drop(&mut self) {
        let mut status = self.tracker.lock();
        status.pending_changes = status.pending_changes.saturating_sub(1);
    }
}
