//! Applies envelope changes written by other devices.
//!
//! ```text
//! sync area change ──► ignore deletions ──► drop own echoes ──► diff old/new
//!                                                                   │
//!                             notify subscribers ◄── write local ◄──┘
//! ```

use log::{debug, error, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::device_identity::DeviceId;
use super::envelope::SyncEnvelope;
use super::listeners::SyncListenerRegistry;
use super::sync_config::SyncConfig;
use super::sync_status::SyncStatusTracker;
use crate::settings::{SettingChange, SettingsChangeSet};
use crate::storage::{StorageArea, StorageChanges, StorageItems};

/// Computes the settings that differ between two envelope snapshots.
///
/// Keys from both sides are considered. With no previous snapshot every
/// key of `new` counts as changed. Keys the local area must not accept
/// are left out.
pub fn diff_envelopes(
    old: Option<&SyncEnvelope>,
    new: &SyncEnvelope,
    config: &SyncConfig,
) -> SettingsChangeSet {
    let keys: BTreeSet<&String> = old
        .into_iter()
        .flat_map(|envelope| envelope.settings.keys())
        .chain(new.settings.keys())
        .collect();

    keys.into_iter()
        .filter(|key| config.accepts_remote_key(key))
        .filter_map(|key| {
            let old_value = old.and_then(|envelope| envelope.get(key));
            let new_value = new.get(key);
            // Structural equality: object key order is not a change.
            (old_value != new_value).then(|| {
                (
                    key.clone(),
                    SettingChange::from_sync(old_value.cloned(), new_value.cloned()),
                )
            })
        })
        .collect()
}

/// Turns cross-device change events into local writes and notifications.
pub struct ChangePropagator {
    local: Arc<dyn StorageArea>,
    device_id: DeviceId,
    config: SyncConfig,
    status: Arc<SyncStatusTracker>,
    listeners: Arc<SyncListenerRegistry>,
}

impl ChangePropagator {
    pub fn new(
        local: Arc<dyn StorageArea>,
        device_id: DeviceId,
        config: SyncConfig,
        status: Arc<SyncStatusTracker>,
        listeners: Arc<SyncListenerRegistry>,
    ) -> Self {
        Self {
            local,
            device_id,
            config,
            status,
            listeners,
        }
    }

    /// Handles one batch of cross-device changes.
    ///
    /// Returns the settings that were applied and announced, or `None` if the
    /// batch was ignored. Failures are logged, never returned.
    pub async fn handle_changes(&self, changes: &StorageChanges) -> Option<SettingsChangeSet> {
        let change = changes.get(&self.config.envelope_key)?;

        let Some(new_raw) = change.new_value.as_ref() else {
            debug!("Sync envelope was removed; deletions are not propagated");
            return None;
        };

        let new_envelope = match SyncEnvelope::decode(new_raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring undecodable sync envelope: {}", e);
                return None;
            }
        };

        if new_envelope.device_id() == Some(&self.device_id) {
            debug!(
                "Ignoring echo of own envelope write (version {})",
                new_envelope.version()
            );
            return None;
        }

        let old_envelope = change
            .old_value
            .as_ref()
            .and_then(|raw| SyncEnvelope::decode(raw).ok());

        let changed = diff_envelopes(old_envelope.as_ref(), &new_envelope, &self.config);
        if changed.is_empty() {
            debug!(
                "Envelope version {} carries no setting changes",
                new_envelope.version()
            );
            return None;
        }

        // Keys dropped from the envelope are announced but kept locally.
        let items: StorageItems = changed
            .iter()
            .filter_map(|(key, change)| {
                change
                    .new_value
                    .as_ref()
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        if !items.is_empty() {
            if let Err(e) = self.local.set(items).await {
                error!("Failed to apply remote settings locally: {}", e);
                self.status.record_error(&e);
                return None;
            }
        }
        self.status.record_sync_time();

        let delivered = self.listeners.notify(&changed);
        debug!(
            "Applied {} remote setting change(s) from {:?}; {} listener(s) notified",
            changed.len(),
            new_envelope.device_id().map(DeviceId::as_str),
            delivered
        );
        Some(changed)
    }

    /// Consumes change events until the channel closes.
    pub fn spawn(self: Arc<Self>, mut changes_rx: broadcast::Receiver<StorageChanges>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match changes_rx.recv().await {
                    Ok(changes) => {
                        self.handle_changes(&changes).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "Sync change listener lagged; {} change batch(es) skipped",
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => {
                        debug!("Sync change channel closed; stopping propagator");
                        break;
                    }
                }
            }
        })
    }
}
