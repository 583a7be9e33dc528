//! Per-installation device identity.
//!
//! The id only exists so a device can recognise its own writes when they come
//! back through the cross-device area. It is not a credential, so losing it is
//! tolerated: if it cannot be read or persisted, a fresh id is used for the
//! rest of the process.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::storage::{StorageArea, StorageItems};

/// Opaque identifier of one installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loads or creates the device id stored in the local area.
pub struct DeviceIdentity {
    local: Arc<dyn StorageArea>,
    storage_key: String,
    cached: OnceCell<DeviceId>,
}

impl DeviceIdentity {
    pub fn new(local: Arc<dyn StorageArea>, storage_key: impl Into<String>) -> Self {
        Self {
            local,
            storage_key: storage_key.into(),
            cached: OnceCell::new(),
        }
    }

    /// Returns the device id, creating and persisting one on first use.
    ///
    /// Repeated calls return the same id for the lifetime of this instance.
    pub async fn get_or_create(&self) -> DeviceId {
        self.cached
            .get_or_init(|| self.load_or_generate())
            .await
            .clone()
    }

    /// The id if it has already been resolved.
    pub fn cached(&self) -> Option<DeviceId> {
        self.cached.get().cloned()
    }

    async fn load_or_generate(&self) -> DeviceId {
        match self.local.get(&[self.storage_key.as_str()]).await {
            Ok(items) => {
                let stored = items
                    .get(&self.storage_key)
                    .and_then(Value::as_str)
                    .filter(|id| !id.trim().is_empty());
                if let Some(id) = stored {
                    return DeviceId::new(id);
                }
            }
            Err(e) => {
                // Do not persist here: the stored id may still be intact.
                let id = DeviceId::generate();
                warn!(
                    "Failed to read device id: {}. Using {} for this session only",
                    e, id
                );
                return id;
            }
        }

        let id = DeviceId::generate();
        let items = StorageItems::from([(
            self.storage_key.clone(),
            Value::String(id.as_str().to_string()),
        )]);
        match self.local.set(items).await {
            Ok(()) => debug!("Generated new device id {}", id),
            Err(e) => warn!(
                "Failed to persist device id {}: {}. Using it for this session only",
                id, e
            ),
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorageArea, StorageAreaKind};
    use crate::sync::test_support::FlakyStorageArea;
    use serde_json::json;

    const KEY: &str = "sync_device_id";

    #[tokio::test]
    async fn test_generates_and_persists_once() {
        let local = Arc::new(MemoryStorageArea::new(StorageAreaKind::Local));
        let identity = DeviceIdentity::new(local.clone(), KEY);

        let first = identity.get_or_create().await;
        let second = identity.get_or_create().await;

        assert_eq!(first, second);
        assert_eq!(local.snapshot()[KEY], json!(first.as_str()));
    }

    #[tokio::test]
    async fn test_reuses_id_across_restarts() {
        let local = Arc::new(MemoryStorageArea::new(StorageAreaKind::Local));
        let first = DeviceIdentity::new(local.clone(), KEY).get_or_create().await;
        let after_restart = DeviceIdentity::new(local.clone(), KEY).get_or_create().await;

        assert_eq!(first, after_restart);
    }

    #[tokio::test]
    async fn test_blank_stored_id_is_replaced() {
        let local = Arc::new(MemoryStorageArea::with_items(
            StorageAreaKind::Local,
            StorageItems::from([(KEY.to_string(), json!("  "))]),
        ));
        let id = DeviceIdentity::new(local.clone(), KEY).get_or_create().await;

        assert!(!id.as_str().trim().is_empty());
        assert_eq!(local.snapshot()[KEY], json!(id.as_str()));
    }

    #[tokio::test]
    async fn test_persistence_failure_degrades_to_session_id() {
        let local = Arc::new(FlakyStorageArea::new(StorageAreaKind::Local));
        local.fail_writes(true);
        let identity = DeviceIdentity::new(local.clone(), KEY);

        let id = identity.get_or_create().await;

        assert!(!id.as_str().is_empty());
        assert_eq!(identity.cached(), Some(id.clone()));
        assert_eq!(identity.get_or_create().await, id);
        assert!(local.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_does_not_overwrite_stored_id() {
        let local = Arc::new(FlakyStorageArea::with_items(
            StorageAreaKind::Local,
            StorageItems::from([(KEY.to_string(), json!("persisted-id"))]),
        ));
        local.fail_reads(true);

        let id = DeviceIdentity::new(local.clone(), KEY).get_or_create().await;

        assert_ne!(id.as_str(), "persisted-id");
        assert_eq!(local.snapshot()[KEY], json!("persisted-id"));
    }
}
