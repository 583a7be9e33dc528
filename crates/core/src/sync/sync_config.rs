//! Engine configuration.

use crate::constants::{
    DEVICE_ID_KEY, ENVELOPE_METADATA_KEY, LEGACY_SYNC_KEYS, SYNC_ENVELOPE_KEY,
    SYNC_INITIALIZED_KEY, SYNC_QUOTA_BYTES_PER_ITEM,
};
use crate::settings::SettingKey;

/// Storage key layout and limits used by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Cross-device key holding the envelope.
    pub envelope_key: String,
    /// Local key holding the device id.
    pub device_id_key: String,
    /// Local flag marking that the first pull has completed.
    pub initialized_key: String,
    /// Pre-envelope top-level keys read once by migration.
    pub legacy_keys: Vec<String>,
    /// Maximum encoded envelope size; `None` disables the check.
    pub max_envelope_bytes: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            envelope_key: SYNC_ENVELOPE_KEY.to_string(),
            device_id_key: DEVICE_ID_KEY.to_string(),
            initialized_key: SYNC_INITIALIZED_KEY.to_string(),
            legacy_keys: LEGACY_SYNC_KEYS.iter().map(|k| k.to_string()).collect(),
            max_envelope_bytes: Some(SYNC_QUOTA_BYTES_PER_ITEM),
        }
    }
}

impl SyncConfig {
    pub fn with_envelope_key(mut self, key: impl Into<String>) -> Self {
        self.envelope_key = key.into();
        self
    }

    pub fn with_legacy_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_envelope_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_envelope_bytes = limit;
        self
    }

    /// Whether a key found in the envelope may be written to the local area.
    ///
    /// Device-local settings and the engine's own reserved keys are never
    /// taken from the envelope, even if another device put them there.
    pub fn accepts_remote_key(&self, key: &str) -> bool {
        key != ENVELOPE_METADATA_KEY
            && key != self.device_id_key
            && key != self.initialized_key
            && !SettingKey::is_device_local_name(key)
    }
}
