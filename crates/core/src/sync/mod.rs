//! Settings synchronization engine.
//!
//! Keeps settings consistent between the fast local area and the
//! eventually-consistent cross-device area, without a server.

mod coordinator;
mod device_identity;
mod envelope;
mod listeners;
mod migration;
mod propagator;
mod sync_config;
mod sync_status;

pub use coordinator::{CoordinatorState, SettingsSyncServiceTrait, SyncCoordinator};
pub use device_identity::{DeviceId, DeviceIdentity};
pub use envelope::{encoded_size, read_envelope, EnvelopeMetadata, SyncEnvelope};
pub use listeners::{ListenerId, SyncChangeListener, SyncListenerRegistry};
pub use migration::{migrate_legacy, run_legacy_migration, MigrationOutcome};
pub use propagator::{diff_envelopes, ChangePropagator};
pub use sync_config::SyncConfig;
pub use sync_status::{PendingChangeGuard, SyncStatus, SyncStatusTracker, SyncingGuard};

#[cfg(test)]
mod test_support;
