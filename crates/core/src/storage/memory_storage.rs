//! In-process storage area.

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

use super::storage_model::{StorageAreaKind, StorageChange, StorageChanges, StorageItems};
use super::storage_traits::StorageArea;
use crate::errors::Result;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Storage area held entirely in memory.
///
/// Useful for hosts without durable storage and as the shared "cross-device"
/// area when several engines run in one process.
pub struct MemoryStorageArea {
    kind: StorageAreaKind,
    items: RwLock<HashMap<String, serde_json::Value>>,
    changes_tx: broadcast::Sender<StorageChanges>,
}

impl MemoryStorageArea {
    pub fn new(kind: StorageAreaKind) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            kind,
            items: RwLock::new(HashMap::new()),
            changes_tx,
        }
    }

    /// Creates an area pre-populated with `items`. No change event is emitted.
    pub fn with_items(kind: StorageAreaKind, items: StorageItems) -> Self {
        let area = Self::new(kind);
        *area.items.write().unwrap_or_else(PoisonError::into_inner) = items;
        area
    }

    /// Returns a copy of everything stored in the area.
    pub fn snapshot(&self) -> StorageItems {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        // No receivers is fine; nobody is listening yet.
        if self.changes_tx.send(changes).is_err() {
            debug!("No subscribers for {} storage changes", self.kind);
        }
    }
}

#[async_trait]
impl StorageArea for MemoryStorageArea {
    fn kind(&self) -> StorageAreaKind {
        self.kind
    }

    async fn get(&self, keys: &[&str]) -> Result<StorageItems> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|key| items.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, new_items: StorageItems) -> Result<()> {
        let mut changes = StorageChanges::new();
        {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in new_items {
                let old_value = items.insert(key.clone(), value.clone());
                let change = StorageChange::new(old_value, Some(value));
                if change.is_effective() {
                    changes.insert(key, change);
                }
            }
        }
        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut changes = StorageChanges::new();
        {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            for key in keys {
                if let Some(old_value) = items.remove(*key) {
                    changes.insert(key.to_string(), StorageChange::new(Some(old_value), None));
                }
            }
        }
        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes_tx.subscribe()
    }
}
