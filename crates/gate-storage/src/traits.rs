//! Storage trait definitions.

use crate::StorageResult;

/// Trait for durable key-value backends.
///
/// Values are opaque strings; callers that store structured data encode
/// it as JSON themselves.
pub trait PersistentKv: Send + Sync {
    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a value. Returns true if something was removed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
