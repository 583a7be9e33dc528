//! SQLite implementation of the storage-area trait.

mod model;
mod repository;

pub use model::StorageItemDB;
pub use repository::{open_storage, SqliteStorageArea};

// Re-export trait from core for convenience
pub use bookmarkwise_core::storage::StorageArea;
