//! Bookmarkwise Core - settings synchronization engine.
//!
//! This crate keeps the extension's settings (AI credentials, prompt
//! templates, theme, locale, feature flags) consistent across devices. It is
//! storage-agnostic: hosts provide the local and cross-device areas through
//! the [`storage::StorageArea`] trait, and `bookmarkwise-storage-sqlite`
//! provides a durable implementation.

pub mod constants;
pub mod errors;
pub mod settings;
pub mod storage;
pub mod sync;

pub use errors::Error;
pub use errors::Result;
pub use settings::SettingKey;
pub use sync::{SettingsSyncServiceTrait, SyncConfig, SyncCoordinator, SyncStatus};
