//! Settings sync coordinator.
//!
//! Facade over the local and cross-device storage areas:
//!
//! ```text
//! SyncCoordinator
//!       │
//!       ├─► local area   (every read, first leg of every write)
//!       ├─► sync area    (envelope read-modify-write, forced pulls)
//!       ├─► DeviceIdentity
//!       └─► ChangePropagator (spawned once by `initialize`)
//! ```
//!
//! # Concurrency
//!
//! Envelope writes are not serialised. Two overlapping `set` calls can read
//! the same envelope and each write back a copy missing the other's key; the
//! later write wins. `manual_sync` only guards against itself.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;

use super::device_identity::{DeviceId, DeviceIdentity};
use super::envelope::{encoded_size, read_envelope, SyncEnvelope};
use super::listeners::{ListenerId, SyncChangeListener, SyncListenerRegistry};
use super::migration::{run_legacy_migration, MigrationOutcome};
use super::propagator::ChangePropagator;
use super::sync_config::SyncConfig;
use super::sync_status::{SyncStatus, SyncStatusTracker};
use crate::errors::{Error, Result, ValidationError};
use crate::settings::SettingKey;
use crate::storage::{StorageArea, StorageItems};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Contract consumed by the rest of the extension.
#[async_trait]
pub trait SettingsSyncServiceTrait: Send + Sync {
    /// Bootstraps sync. Idempotent, and never fails: errors are logged and
    /// the engine continues with local settings only.
    async fn initialize(&self);

    /// Reads a setting from the local area.
    async fn get(&self, key: SettingKey) -> Result<Option<Value>>;

    /// Writes a setting locally, then into the envelope if it is syncable.
    async fn set(&self, key: SettingKey, value: Value) -> Result<()>;

    /// Overwrites local settings with the envelope contents.
    async fn manual_sync(&self) -> Result<()>;

    fn get_sync_status(&self) -> SyncStatus;

    fn on_sync_change(&self, listener: SyncChangeListener) -> ListenerId;

    /// Returns false if the listener was not registered.
    fn off_sync_change(&self, id: ListenerId) -> bool;
}

pub struct SyncCoordinator {
    local: Arc<dyn StorageArea>,
    sync: Arc<dyn StorageArea>,
    config: SyncConfig,
    identity: DeviceIdentity,
    status: Arc<SyncStatusTracker>,
    listeners: Arc<SyncListenerRegistry>,
    state: RwLock<CoordinatorState>,
    init_lock: tokio::sync::Mutex<()>,
    propagator_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn StorageArea>,
        sync: Arc<dyn StorageArea>,
        config: SyncConfig,
    ) -> Self {
        let identity = DeviceIdentity::new(Arc::clone(&local), config.device_id_key.clone());
        Self {
            local,
            sync,
            config,
            identity,
            status: Arc::new(SyncStatusTracker::new()),
            listeners: Arc::new(SyncListenerRegistry::new()),
            state: RwLock::new(CoordinatorState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            propagator_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// This device's id, once `initialize` or a sync write resolved it.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.identity.cached()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reads a setting and deserializes it into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: SettingKey) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ValidationError::invalid_value(key.as_str(), e).into()),
            None => Ok(None),
        }
    }

    /// Serializes `value` and writes it like [`SettingsSyncServiceTrait::set`].
    pub async fn set_as<T: Serialize + Sync>(&self, key: SettingKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::from(ValidationError::invalid_value(key.as_str(), e)))?;
        self.set(key, value).await
    }

    fn set_state(&self, state: CoordinatorState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn bootstrap(&self, device_id: &DeviceId) -> Result<()> {
        match run_legacy_migration(self.sync.as_ref(), &self.config, device_id).await? {
            MigrationOutcome::Migrated { keys } => {
                info!("Settings envelope created from {} legacy key(s)", keys.len())
            }
            outcome => debug!("Legacy migration: {:?}", outcome),
        }

        if self.is_locally_initialized().await? {
            debug!("Local settings already seeded from sync");
        } else {
            info!("First sync on this device, pulling settings envelope");
            self.manual_sync().await?;
        }
        Ok(())
    }

    async fn is_locally_initialized(&self) -> Result<bool> {
        let items = self.local.get(&[self.config.initialized_key.as_str()]).await?;
        Ok(items
            .get(&self.config.initialized_key)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn install_propagator(&self, device_id: DeviceId) {
        let mut task = self
            .propagator_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let propagator = Arc::new(ChangePropagator::new(
            Arc::clone(&self.local),
            device_id,
            self.config.clone(),
            Arc::clone(&self.status),
            Arc::clone(&self.listeners),
        ));
        *task = Some(propagator.spawn(self.sync.subscribe()));
        debug!("Sync change listener installed");
    }

    /// Read-modify-write of the envelope. Returns the new version.
    async fn push_to_envelope(&self, key: &str, value: Value) -> Result<u64> {
        let _pending = self.status.begin_pending();
        let device_id = self.identity.get_or_create().await;

        let current = read_envelope(self.sync.as_ref(), &self.config.envelope_key).await?;
        let next = SyncEnvelope::write_key(current.as_ref(), key, value, &device_id, Utc::now());
        let encoded = next.encode();

        if let Some(limit) = self.config.max_envelope_bytes {
            let size = encoded_size(&self.config.envelope_key, &encoded)?;
            if size > limit {
                return Err(Error::QuotaExceeded { size, limit });
            }
        }

        self.sync
            .set(StorageItems::from([(self.config.envelope_key.clone(), encoded)]))
            .await?;
        Ok(next.version())
    }

    /// Copies every acceptable envelope key into the local area and marks the
    /// device as seeded. Returns the number of settings copied.
    async fn pull(&self) -> Result<usize> {
        let envelope = read_envelope(self.sync.as_ref(), &self.config.envelope_key).await?;

        let mut items: StorageItems = envelope
            .map(|envelope| {
                envelope
                    .settings
                    .into_iter()
                    .filter(|(key, _)| self.config.accepts_remote_key(key))
                    .collect()
            })
            .unwrap_or_default();
        let pulled = items.len();

        items.insert(self.config.initialized_key.clone(), Value::Bool(true));
        self.local.set(items).await?;
        Ok(pulled)
    }
}

#[async_trait]
impl SettingsSyncServiceTrait for SyncCoordinator {
    async fn initialize(&self) {
        let _init = self.init_lock.lock().await;
        if self.state() == CoordinatorState::Ready {
            debug!("Settings sync already initialized");
            return;
        }
        self.set_state(CoordinatorState::Initializing);

        let device_id = self.identity.get_or_create().await;
        if let Err(e) = self.bootstrap(&device_id).await {
            error!(
                "Settings sync initialization failed, continuing with local settings: {}",
                e
            );
            self.status.record_error(&e);
        }

        self.install_propagator(device_id.clone());
        self.set_state(CoordinatorState::Ready);
        info!("Settings sync ready on device {}", device_id);
    }

    async fn get(&self, key: SettingKey) -> Result<Option<Value>> {
        let mut items = self.local.get(&[key.as_str()]).await?;
        Ok(items.remove(key.as_str()))
    }

    async fn set(&self, key: SettingKey, value: Value) -> Result<()> {
        let name = key.as_str();

        let local_write = self
            .local
            .set(StorageItems::from([(name.to_string(), value.clone())]))
            .await;
        if let Err(e) = local_write {
            error!("Failed to store setting '{}' locally: {}", name, e);
            self.status.record_error(&e);
            return Err(e);
        }

        if !key.is_syncable() {
            return Ok(());
        }
        if self.state() != CoordinatorState::Ready {
            debug!("Sync not ready; '{}' stored locally only", name);
            return Ok(());
        }

        match self.push_to_envelope(name, value).await {
            Ok(version) => {
                self.status.record_success();
                debug!("Synced '{}' (envelope version {})", name, version);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to sync setting '{}': {}", name, e);
                self.status.record_error(&e);
                Err(e)
            }
        }
    }

    async fn manual_sync(&self) -> Result<()> {
        let Some(_syncing) = self.status.try_begin_sync() else {
            debug!("Manual sync already in progress, skipping");
            return Ok(());
        };

        match self.pull().await {
            Ok(pulled) => {
                self.status.record_success();
                info!("Pulled {} setting(s) from sync", pulled);
                Ok(())
            }
            Err(e) => {
                error!("Manual sync failed: {}", e);
                self.status.record_error(&e);
                Err(e)
            }
        }
    }

    fn get_sync_status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    fn on_sync_change(&self, listener: SyncChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn off_sync_change(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        let task = self
            .propagator_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}
