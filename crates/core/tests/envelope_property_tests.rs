//! Property-based tests for envelope writes and remote change detection.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use bookmarkwise_core::settings::SettingKey;
use bookmarkwise_core::sync::{diff_envelopes, DeviceId, SyncConfig, SyncEnvelope};

// =============================================================================
// Generators
// =============================================================================

/// Setting names as they can appear in an envelope, including names this
/// device must never apply.
fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(SettingKey::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>())
            .prop_map(str::to_string),
        Just("sync_device_id".to_string()),
        Just("sync_initialized".to_string()),
        "[a-z]{3,12}",
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        prop::collection::vec("[a-z]{1,8}", 0..4).prop_map(|items| json!(items)),
    ]
}

fn arb_envelope() -> impl Strategy<Value = SyncEnvelope> {
    (
        prop::collection::btree_map(arb_key(), arb_value(), 0..8),
        0u64..1_000,
    )
        .prop_map(|(settings, version)| {
            let mut raw: serde_json::Map<String, Value> = settings.into_iter().collect();
            raw.insert(
                "_metadata".to_string(),
                json!({ "lastModified": 1700000000000i64, "deviceId": "peer", "version": version }),
            );
            SyncEnvelope::decode(&Value::Object(raw)).expect("object envelopes decode")
        })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn write_key_bumps_version_and_keeps_other_settings(
        current in prop::option::of(arb_envelope()),
        key in arb_key(),
        value in arb_value(),
    ) {
        let device = DeviceId::new("device-a");
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let next = SyncEnvelope::write_key(current.as_ref(), &key, value.clone(), &device, now);

        let base = current.as_ref().map_or(0, SyncEnvelope::version);
        prop_assert_eq!(next.version(), base + 1);
        prop_assert_eq!(next.device_id(), Some(&device));
        prop_assert_eq!(next.get(&key), Some(&value));

        let untouched: BTreeMap<&String, &Value> = current
            .iter()
            .flat_map(|e| e.settings.iter())
            .filter(|(k, _)| **k != key)
            .collect();
        for (k, v) in untouched {
            prop_assert_eq!(next.get(k), Some(v));
        }
    }

    #[test]
    fn diff_never_reports_reserved_or_device_local_keys(
        old in prop::option::of(arb_envelope()),
        new in arb_envelope(),
    ) {
        let config = SyncConfig::default();
        let changes = diff_envelopes(old.as_ref(), &new, &config);

        for name in changes.keys() {
            prop_assert!(config.accepts_remote_key(name));
            prop_assert!(!SettingKey::is_device_local_name(name));
        }
    }

    #[test]
    fn diff_reports_exactly_the_changed_values(
        old in arb_envelope(),
        new in arb_envelope(),
    ) {
        let config = SyncConfig::default();
        let changes = diff_envelopes(Some(&old), &new, &config);

        for (name, change) in &changes {
            prop_assert_eq!(change.old_value.as_ref(), old.get(name));
            prop_assert_eq!(change.new_value.as_ref(), new.get(name));
            prop_assert_ne!(change.old_value.as_ref(), change.new_value.as_ref());
        }
        prop_assert!(diff_envelopes(Some(&new), &new, &config).is_empty());
    }

    #[test]
    fn encode_then_decode_preserves_settings_and_version(envelope in arb_envelope()) {
        let decoded = SyncEnvelope::decode(&envelope.encode()).unwrap();
        prop_assert_eq!(decoded, envelope);
    }
}
