//! Setting names and change notification payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// Every setting name the extension knows about.
///
/// Syncable settings travel in the cross-device envelope. Device-local
/// settings (ids that only make sense on this browser profile) never leave
/// the local area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    /// AI provider endpoint, model and credentials
    AiConfig,
    Theme,
    Locale,
    /// Rename and classification prompt templates
    PromptTemplates,
    FeatureFlags,
    /// Id of the bookmark folder the extension manages on this device
    BookmarkRootFolderId,
    LastExportFormat,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::AiConfig,
        SettingKey::Theme,
        SettingKey::Locale,
        SettingKey::PromptTemplates,
        SettingKey::FeatureFlags,
        SettingKey::BookmarkRootFolderId,
        SettingKey::LastExportFormat,
    ];

    /// Storage name of the setting, identical in both areas.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::AiConfig => "aiConfig",
            SettingKey::Theme => "theme",
            SettingKey::Locale => "locale",
            SettingKey::PromptTemplates => "promptTemplates",
            SettingKey::FeatureFlags => "featureFlags",
            SettingKey::BookmarkRootFolderId => "bookmarkRootFolderId",
            SettingKey::LastExportFormat => "lastExportFormat",
        }
    }

    /// Whether the setting participates in envelope writes.
    pub fn is_syncable(&self) -> bool {
        !matches!(
            self,
            SettingKey::BookmarkRootFolderId | SettingKey::LastExportFormat
        )
    }

    pub fn syncable() -> impl Iterator<Item = SettingKey> {
        Self::ALL.into_iter().filter(SettingKey::is_syncable)
    }

    /// Returns true if `name` is a known setting that must stay on this device.
    pub fn is_device_local_name(name: &str) -> bool {
        name.parse::<SettingKey>()
            .map(|key| !key.is_syncable())
            .unwrap_or(false)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownSettingKey(s.to_string()))
    }
}

/// Where a change notification originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ChangeSource {
    /// Written by another device and received through the cross-device area.
    Sync,
}

/// A single setting change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub source: ChangeSource,
}

impl SettingChange {
    pub fn from_sync(old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            old_value,
            new_value,
            source: ChangeSource::Sync,
        }
    }
}

/// Changes keyed by setting name. Names are kept as strings because an
/// envelope written by a newer release may carry settings this build does
/// not know.
pub type SettingsChangeSet = BTreeMap<String, SettingChange>;
