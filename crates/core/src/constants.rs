/// Key holding the settings envelope in the cross-device area
pub const SYNC_ENVELOPE_KEY: &str = "app_settings";

/// Reserved envelope field carrying write metadata
pub const ENVELOPE_METADATA_KEY: &str = "_metadata";

/// Local key holding this installation's device id
pub const DEVICE_ID_KEY: &str = "sync_device_id";

/// Local flag set once the first pull from the envelope has completed
pub const SYNC_INITIALIZED_KEY: &str = "sync_initialized";

/// Top-level cross-device keys used before the envelope layout existed
pub const LEGACY_SYNC_KEYS: &[&str] = &["aiConfig", "theme", "locale", "promptTemplates"];

/// Per-item quota of the cross-device area, in bytes
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8192;
