//! Migration of the pre-envelope layout.
//!
//! Older releases stored each syncable setting as its own top-level key in
//! the cross-device area. On first start those keys are folded into a new
//! envelope. The legacy keys are left in place.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use super::device_identity::DeviceId;
use super::envelope::{EnvelopeMetadata, SyncEnvelope};
use super::sync_config::SyncConfig;
use crate::errors::Result;
use crate::storage::{StorageArea, StorageItems};

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// An envelope already exists; legacy keys were not read.
    EnvelopePresent,
    /// Neither an envelope nor legacy keys were found.
    NothingToMigrate,
    /// A new envelope was written from these legacy keys.
    Migrated { keys: Vec<String> },
}

/// Builds the first envelope from legacy flat keys.
pub fn migrate_legacy(legacy: StorageItems, device_id: &DeviceId, now: DateTime<Utc>) -> SyncEnvelope {
    SyncEnvelope {
        settings: legacy.into_iter().collect(),
        metadata: Some(EnvelopeMetadata {
            last_modified: now,
            device_id: Some(device_id.clone()),
            version: 1,
            migrated: true,
        }),
    }
}

/// Runs the one-time legacy migration against the cross-device area.
pub async fn run_legacy_migration(
    sync: &dyn StorageArea,
    config: &SyncConfig,
    device_id: &DeviceId,
) -> Result<MigrationOutcome> {
    let existing = sync.get(&[config.envelope_key.as_str()]).await?;
    if existing.contains_key(&config.envelope_key) {
        debug!("Sync envelope present, skipping legacy migration");
        return Ok(MigrationOutcome::EnvelopePresent);
    }

    let legacy_keys: Vec<&str> = config.legacy_keys.iter().map(String::as_str).collect();
    let legacy = sync.get(&legacy_keys).await?;
    if legacy.is_empty() {
        debug!("No legacy sync keys found");
        return Ok(MigrationOutcome::NothingToMigrate);
    }

    let mut keys: Vec<String> = legacy.keys().cloned().collect();
    keys.sort();

    let envelope = migrate_legacy(legacy, device_id, Utc::now());
    sync.set(StorageItems::from([(
        config.envelope_key.clone(),
        envelope.encode(),
    )]))
    .await?;

    info!("Migrated legacy sync keys into envelope: {:?}", keys);
    Ok(MigrationOutcome::Migrated { keys })
}
