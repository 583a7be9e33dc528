use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::model::StorageItemDB;
use crate::db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
use crate::errors::StorageSqliteError;
use crate::schema::storage_items;
use bookmarkwise_core::errors::{Error, Result, StorageError};
use bookmarkwise_core::storage::{
    StorageArea, StorageAreaKind, StorageChange, StorageChanges, StorageItems,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A storage area persisted in the `storage_items` table.
///
/// Reads use pooled connections. Writes go through the shared writer actor,
/// which reads the previous values and applies the batch in one transaction;
/// change events are broadcast once that transaction has committed. Events
/// cover writes made through this instance only.
pub struct SqliteStorageArea {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    kind: StorageAreaKind,
    changes_tx: broadcast::Sender<StorageChanges>,
}

impl SqliteStorageArea {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, kind: StorageAreaKind) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        SqliteStorageArea {
            pool,
            writer,
            kind,
            changes_tx,
        }
    }

    fn read_error(&self, e: impl fmt::Display) -> Error {
        StorageError::read_failed(self.kind, e.to_string()).into()
    }

    fn write_error(&self, e: impl fmt::Display) -> Error {
        StorageError::write_failed(self.kind, e.to_string()).into()
    }

    fn publish(&self, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        if self.changes_tx.send(changes).is_err() {
            debug!("No subscribers for {} storage changes", self.kind);
        }
    }
}

/// Opens (creating and migrating if needed) the settings database under
/// `data_dir` and returns its local and sync areas.
pub fn open_storage(
    data_dir: &str,
) -> Result<(Arc<SqliteStorageArea>, Arc<SqliteStorageArea>)> {
    let db_path = init(data_dir)?;
    let pool = create_pool(&db_path)?;
    run_migrations(&pool)?;
    let writer = spawn_writer((*pool).clone());
    info!("Settings storage opened at {}", db_path);

    let local = SqliteStorageArea::new(Arc::clone(&pool), writer.clone(), StorageAreaKind::Local);
    let sync = SqliteStorageArea::new(pool, writer, StorageAreaKind::Sync);
    Ok((Arc::new(local), Arc::new(sync)))
}

// Previous value of a key, as seen inside the writer's transaction. A value
// that no longer parses is reported as absent.
fn stored_value(
    conn: &mut SqliteConnection,
    area: &str,
    key: &str,
) -> std::result::Result<Option<Value>, StorageSqliteError> {
    let raw = storage_items::table
        .filter(storage_items::area.eq(area))
        .filter(storage_items::item_key.eq(key))
        .select(storage_items::item_value)
        .first::<String>(conn)
        .optional()?;

    Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable {} value for '{}': {}", area, key, e);
            None
        }
    }))
}

#[async_trait]
impl StorageArea for SqliteStorageArea {
    fn kind(&self) -> StorageAreaKind {
        self.kind
    }

    async fn get(&self, keys: &[&str]) -> Result<StorageItems> {
        if keys.is_empty() {
            return Ok(StorageItems::new());
        }

        let mut conn = get_connection(&self.pool).map_err(|e| self.read_error(e))?;
        let rows = storage_items::table
            .filter(storage_items::area.eq(self.kind.as_str()))
            .filter(storage_items::item_key.eq_any(keys.to_vec()))
            .load::<StorageItemDB>(&mut conn)
            .map_err(|e| self.read_error(e))?;

        rows.into_iter()
            .map(|row| {
                let value = row
                    .value()
                    .map_err(|e| self.read_error(format!("'{}': {}", row.item_key, e)))?;
                Ok((row.item_key, value))
            })
            .collect()
    }

    async fn set(&self, items: StorageItems) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let now = Utc::now().naive_utc();
        let rows = items
            .into_iter()
            .map(|(key, value)| {
                StorageItemDB::new(self.kind, &key, &value, now).map(|row| (row, value))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| self.write_error(e))?;

        let changes = self
            .writer
            .exec(move |conn| {
                let mut changes = StorageChanges::new();
                for (row, value) in rows {
                    let old_value = stored_value(conn, &row.area, &row.item_key)?;
                    let change = StorageChange::new(old_value, Some(value));
                    if !change.is_effective() {
                        continue;
                    }
                    diesel::replace_into(storage_items::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageSqliteError::from)?;
                    changes.insert(row.item_key, change);
                }
                Ok(changes)
            })
            .await
            .map_err(|e| self.write_error(e))?;

        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let area = self.kind.as_str();
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        let changes = self
            .writer
            .exec(move |conn| {
                let mut changes = StorageChanges::new();
                for key in keys {
                    let old_value = stored_value(conn, area, &key)?;
                    let deleted = diesel::delete(
                        storage_items::table
                            .filter(storage_items::area.eq(area))
                            .filter(storage_items::item_key.eq(&key)),
                    )
                    .execute(conn)
                    .map_err(StorageSqliteError::from)?;
                    if deleted > 0 && old_value.is_some() {
                        changes.insert(key, StorageChange::new(old_value, None));
                    }
                }
                Ok(changes)
            })
            .await
            .map_err(|e| self.write_error(e))?;

        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Creates both areas over a fresh database file.
    /// Returns the temp dir as well to keep it alive.
    fn create_test_areas() -> (SqliteStorageArea, SqliteStorageArea, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        let pool = create_pool(&db_path.to_string_lossy()).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer((*pool).clone());

        let local = SqliteStorageArea::new(Arc::clone(&pool), writer.clone(), StorageAreaKind::Local);
        let sync = SqliteStorageArea::new(pool, writer, StorageAreaKind::Sync);
        (local, sync, temp_dir)
    }

    fn items(pairs: &[(&str, Value)]) -> StorageItems {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_get_returns_only_stored_keys() {
        let (local, _sync, _temp_dir) = create_test_areas();
        local
            .set(items(&[("theme", json!("dark")), ("locale", json!("fr"))]))
            .await
            .unwrap();

        let found = local.get(&["theme", "aiConfig"]).await.unwrap();

        assert_eq!(found, items(&[("theme", json!("dark"))]));
        assert!(local.get(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_areas_share_a_file_but_not_keys() {
        let (local, sync, _temp_dir) = create_test_areas();

        local.set(items(&[("theme", json!("dark"))])).await.unwrap();
        sync.set(items(&[("theme", json!("light"))])).await.unwrap();

        assert_eq!(local.get(&["theme"]).await.unwrap()["theme"], json!("dark"));
        assert_eq!(sync.get(&["theme"]).await.unwrap()["theme"], json!("light"));
    }

    #[tokio::test]
    async fn test_set_publishes_only_effective_changes() {
        let (_local, sync, _temp_dir) = create_test_areas();
        let mut rx = sync.subscribe();

        sync.set(items(&[("app_settings", json!({ "theme": "dark" }))]))
            .await
            .unwrap();
        let changes = rx.try_recv().unwrap();
        assert_eq!(
            changes["app_settings"],
            StorageChange::new(None, Some(json!({ "theme": "dark" })))
        );

        // Same value again: nothing to report.
        sync.set(items(&[("app_settings", json!({ "theme": "dark" }))]))
            .await
            .unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        sync.set(items(&[
            ("app_settings", json!({ "theme": "light" })),
            ("theme", json!("legacy")),
        ]))
        .await
        .unwrap();
        let changes = rx.try_recv().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes["app_settings"].old_value,
            Some(json!({ "theme": "dark" }))
        );
    }

    #[tokio::test]
    async fn test_remove_reports_deleted_keys() {
        let (local, _sync, _temp_dir) = create_test_areas();
        local
            .set(items(&[("theme", json!("dark")), ("locale", json!("fr"))]))
            .await
            .unwrap();
        let mut rx = local.subscribe();

        local.remove(&["theme", "missing"]).await.unwrap();

        let changes = rx.try_recv().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes["theme"],
            StorageChange::new(Some(json!("dark")), None)
        );
        assert!(local.get(&["theme"]).await.unwrap().is_empty());

        local.remove(&["missing"]).await.unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unreadable_row_fails_the_read() {
        let (local, _sync, _temp_dir) = create_test_areas();
        {
            let mut conn = get_connection(&local.pool).unwrap();
            diesel::sql_query(
                "INSERT INTO storage_items (area, item_key, item_value, updated_at) \
                 VALUES ('local', 'theme', '{broken', datetime('now'))",
            )
            .execute(&mut conn)
            .unwrap();
        }

        let err = local.get(&["theme"]).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::ReadFailed { .. })));

        // Overwriting the broken row still works.
        local.set(items(&[("theme", json!("dark"))])).await.unwrap();
        assert_eq!(local.get(&["theme"]).await.unwrap()["theme"], json!("dark"));
    }

    #[tokio::test]
    async fn test_values_survive_reopening_the_pool() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db").to_string_lossy().into_owned();

        {
            let pool = create_pool(&db_path).unwrap();
            run_migrations(&pool).unwrap();
            let area = SqliteStorageArea::new(
                Arc::clone(&pool),
                spawn_writer((*pool).clone()),
                StorageAreaKind::Sync,
            );
            area.set(items(&[("sync_device_id", json!("device-1"))]))
                .await
                .unwrap();
        }

        let pool = create_pool(&db_path).unwrap();
        run_migrations(&pool).unwrap();
        let area = SqliteStorageArea::new(
            Arc::clone(&pool),
            spawn_writer((*pool).clone()),
            StorageAreaKind::Sync,
        );
        assert_eq!(
            area.get(&["sync_device_id"]).await.unwrap()["sync_device_id"],
            json!("device-1")
        );
    }
}
