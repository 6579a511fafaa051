//! Durable key-value storage for the auth gate.
//!
//! This crate provides:
//! - The `PersistentKv` trait: a string-keyed, string-valued store that
//!   survives process restarts (page reloads, full navigations)
//! - `MemoryStorage` for tests and ephemeral hosts
//! - `FileStorage`, a JSON document on disk
//! - `ActionStore`, the typed layer for the pending/resume action records

mod actions;
mod file;
mod keys;
mod memory;
mod traits;

pub use actions::{ActionStore, GateReason, PendingAction, ResumeAction, ResumeKind};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::PersistentKv;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
