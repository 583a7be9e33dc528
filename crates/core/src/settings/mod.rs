//! Settings module - the closed set of setting names and change payloads.

mod settings_model;

pub use settings_model::{ChangeSource, SettingChange, SettingKey, SettingsChangeSet};
