//! Sync envelope codec.
//!
//! The cross-device area holds one envelope: every syncable setting as a
//! top-level field plus a `_metadata` record describing the last write. The
//! envelope is always read, modified and written back as a whole.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::device_identity::DeviceId;
use crate::constants::ENVELOPE_METADATA_KEY;
use crate::errors::{Error, Result};
use crate::storage::StorageArea;

/// Metadata of the last envelope write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Time of the write, stored as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    /// Device that performed the write. Always set on our own writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    /// Incremented by one on every write.
    pub version: u64,
    /// Set when the envelope was built from legacy flat keys.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub migrated: bool,
}

impl EnvelopeMetadata {
    /// Decodes a stored metadata record field by field.
    ///
    /// A missing or malformed field only loses that field: `deviceId` and
    /// `version` are kept whenever they are readable on their own. Returns
    /// `None` if neither of them can be recovered.
    pub fn decode_lenient(raw: &Value) -> Option<Self> {
        if let Ok(metadata) = serde_json::from_value::<EnvelopeMetadata>(raw.clone()) {
            return Some(metadata);
        }

        let Some(object) = raw.as_object() else {
            warn!(
                "Dropping sync envelope metadata: expected an object, found {}",
                json_type(raw)
            );
            return None;
        };

        let device_id = object
            .get("deviceId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(DeviceId::new);
        let version = object.get("version").and_then(Value::as_u64);
        if device_id.is_none() && version.is_none() {
            warn!("Dropping sync envelope metadata: neither deviceId nor version is readable");
            return None;
        }

        let last_modified = object
            .get("lastModified")
            .and_then(Value::as_i64)
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or_default();
        let migrated = object
            .get("migrated")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        warn!(
            "Sync envelope metadata is partly unreadable; recovered deviceId={:?}, version={:?}",
            device_id.as_ref().map(DeviceId::as_str),
            version
        );
        Some(Self {
            last_modified,
            device_id,
            version: version.unwrap_or(0),
            migrated,
        })
    }
}

/// Decoded envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncEnvelope {
    pub settings: BTreeMap<String, Value>,
    /// `None` when the stored envelope lacks usable metadata.
    pub metadata: Option<EnvelopeMetadata>,
}

impl SyncEnvelope {
    /// Decodes a stored envelope.
    ///
    /// Only a non-object value is rejected. Missing or unreadable metadata
    /// decodes as `None` so that the next write can still replace it.
    pub fn decode(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::Envelope(format!("expected an object, found {}", json_type(value)))
        })?;

        let mut settings = BTreeMap::new();
        let mut metadata = None;
        for (key, field) in object {
            if key == ENVELOPE_METADATA_KEY {
                metadata = EnvelopeMetadata::decode_lenient(field);
            } else {
                settings.insert(key.clone(), field.clone());
            }
        }

        Ok(Self { settings, metadata })
    }

    pub fn encode(&self) -> Value {
        let mut object: Map<String, Value> = self
            .settings
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(metadata) = &self.metadata {
            // EnvelopeMetadata has only plain fields; serialization cannot fail.
            if let Ok(encoded) = serde_json::to_value(metadata) {
                object.insert(ENVELOPE_METADATA_KEY.to_string(), encoded);
            }
        }
        Value::Object(object)
    }

    /// Version of the last write, 0 if unknown.
    pub fn version(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |m| m.version)
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        self.metadata.as_ref().and_then(|m| m.device_id.as_ref())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Returns a new envelope with `key` set to `value` and fresh metadata.
    ///
    /// `current` is the envelope as last read; `None` starts from empty.
    pub fn write_key(
        current: Option<&SyncEnvelope>,
        key: &str,
        value: Value,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> SyncEnvelope {
        let mut settings = current.map(|e| e.settings.clone()).unwrap_or_default();
        settings.insert(key.to_string(), value);
        let version = current.map_or(0, SyncEnvelope::version) + 1;

        SyncEnvelope {
            settings,
            metadata: Some(EnvelopeMetadata {
                last_modified: now,
                device_id: Some(device_id.clone()),
                version,
                migrated: false,
            }),
        }
    }
}

/// Reads and decodes the envelope stored under `envelope_key`.
pub async fn read_envelope(
    sync: &dyn StorageArea,
    envelope_key: &str,
) -> Result<Option<SyncEnvelope>> {
    let items = sync.get(&[envelope_key]).await?;
    items.get(envelope_key).map(SyncEnvelope::decode).transpose()
}

/// Size the cross-device area charges for storing `encoded` under `key`.
pub fn encoded_size(key: &str, encoded: &Value) -> Result<usize> {
    Ok(key.len() + serde_json::to_string(encoded)?.len())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
