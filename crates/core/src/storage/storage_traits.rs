//! Storage area trait.
//!
//! Mirrors the shape of a browser extension storage area: batched reads and
//! writes plus a change-notification stream. Implementations are expected to
//! be cheap to share behind an `Arc`.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::storage_model::{StorageAreaKind, StorageChanges, StorageItems};
use crate::errors::Result;

/// Trait defining the contract for a key-value storage area.
#[async_trait]
pub trait StorageArea: Send + Sync {
    /// The area this instance represents.
    fn kind(&self) -> StorageAreaKind;

    /// Reads the given keys. Keys that are not stored are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<StorageItems>;

    /// Writes all items in one batch.
    async fn set(&self, items: StorageItems) -> Result<()>;

    /// Removes the given keys. Removing a missing key is not an error.
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Subscribes to change notifications.
    ///
    /// One `StorageChanges` value is delivered per write that altered at
    /// least one key; unchanged keys are omitted.
    fn subscribe(&self) -> broadcast::Receiver<StorageChanges>;
}
