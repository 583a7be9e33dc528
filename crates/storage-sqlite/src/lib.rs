//! SQLite storage for the Bookmarkwise settings sync engine.
//!
//! This crate implements the `StorageArea` trait from `bookmarkwise-core` on a
//! single SQLite database using Diesel. It contains:
//! - Database connection pooling and the single-writer actor
//! - Embedded Diesel migrations
//! - `SqliteStorageArea`, one instance per area (`local`, `sync`)
//!
//! # Architecture
//!
//! ```text
//!   bookmarkwise-core (SyncCoordinator)
//!                  │  Arc<dyn StorageArea>
//!                  ▼
//!      storage-sqlite (this crate)
//!                  │
//!                  ▼
//!        settings.db: storage_items
//! ```
//!
//! Hosts that relay the `sync` area to other devices do so outside this
//! crate; it only persists what it is given.

pub mod db;
pub mod errors;
pub mod schema;
pub mod storage_area;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageSqliteError};

pub use storage_area::{open_storage, SqliteStorageArea, StorageItemDB};

// Re-export from bookmarkwise-core for convenience
pub use bookmarkwise_core::errors::{Error, Result};
