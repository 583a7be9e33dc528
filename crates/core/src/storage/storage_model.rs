//! Storage substrate models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Key/value pairs read from or written to a storage area.
pub type StorageItems = HashMap<String, Value>;

/// Per-key changes produced by a single write to a storage area.
pub type StorageChanges = HashMap<String, StorageChange>;

/// Which storage area an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAreaKind {
    /// Fast, device-scoped storage. Source of truth for reads.
    Local,
    /// Quota-limited storage propagated across the user's devices.
    Sync,
}

impl StorageAreaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAreaKind::Local => "local",
            StorageAreaKind::Sync => "sync",
        }
    }
}

impl fmt::Display for StorageAreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of a single key. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl StorageChange {
    pub fn new(old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            old_value,
            new_value,
        }
    }

    /// Returns true if the write actually altered the stored value.
    pub fn is_effective(&self) -> bool {
        self.old_value != self.new_value
    }
}
