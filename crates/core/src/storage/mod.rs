//! Storage module - the key-value substrate the sync engine runs on.
//!
//! The engine talks to two areas through the same trait: a fast device-local
//! area and a quota-limited cross-device area that the host propagates to the
//! user's other devices.

mod memory_storage;
mod storage_model;
mod storage_traits;

pub use memory_storage::MemoryStorageArea;
pub use storage_model::{StorageAreaKind, StorageChange, StorageChanges, StorageItems};
pub use storage_traits::StorageArea;
