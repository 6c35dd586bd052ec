//! Storage trait definitions.

use crate::StorageResult;

/// Raw key/value backend for one storage scope.
///
/// Values are opaque strings; envelopes, expiry and obfuscation are layered
/// on top by [`crate::EncryptedScopedStore`].
pub trait ScopeBackend: Send + Sync {
    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether something was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List every key currently stored.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Remove every key.
    fn clear(&self) -> StorageResult<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}
