//! Database model for storage area items.

use bookmarkwise_core::storage::StorageAreaKind;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_json::Value;

use crate::errors::StorageSqliteError;

/// One key of one storage area. Values are stored as JSON text.
#[derive(Queryable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::storage_items)]
pub struct StorageItemDB {
    pub area: String,
    pub item_key: String,
    pub item_value: String,
    pub updated_at: NaiveDateTime,
}

impl StorageItemDB {
    pub fn new(
        area: StorageAreaKind,
        key: &str,
        value: &Value,
        updated_at: NaiveDateTime,
    ) -> Result<Self, StorageSqliteError> {
        Ok(Self {
            area: area.as_str().to_string(),
            item_key: key.to_string(),
            item_value: serde_json::to_string(value)?,
            updated_at,
        })
    }

    /// Decodes the stored JSON value.
    pub fn value(&self) -> Result<Value, StorageSqliteError> {
        Ok(serde_json::from_str(&self.item_value)?)
    }
}
