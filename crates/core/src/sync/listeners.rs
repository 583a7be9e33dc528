//! Subscriber registry for remote setting changes.

use log::{error, warn};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::Result;
use crate::settings::SettingsChangeSet;

/// Callback invoked with the settings changed by another device.
pub type SyncChangeListener = Arc<dyn Fn(&SettingsChangeSet) -> Result<()> + Send + Sync>;

/// Handle returned when subscribing; used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Set of subscribers. Delivery order between subscribers is unspecified.
#[derive(Default)]
pub struct SyncListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<ListenerId, SyncChangeListener>>,
}

impl SyncListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: SyncChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every subscriber with `changes`.
    ///
    /// A subscriber that returns an error or panics is logged and skipped;
    /// the rest are still called. Returns the number of subscribers that
    /// handled the changes successfully.
    pub fn notify(&self, changes: &SettingsChangeSet) -> usize {
        // Snapshot so subscribers may (un)subscribe from inside the callback.
        let listeners: Vec<(ListenerId, SyncChangeListener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(changes))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Sync change listener {:?} failed: {}", id, e),
                Err(payload) => error!(
                    "Sync change listener {:?} panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                ),
            }
        }
        delivered
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
