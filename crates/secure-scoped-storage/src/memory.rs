//! In-process backend for the ephemeral scope.

use crate::{ScopeBackend, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key/value map that lives exactly as long as the process.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeBackend for MemoryBackend {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.data.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend() {
        let storage = MemoryBackend::new();

        storage.set("test_key", "test_value").unwrap();
        assert_eq!(
            storage.get("test_key").unwrap(),
            Some("test_value".to_string())
        );

        assert!(storage.has("test_key").unwrap());
        assert!(!storage.has("nonexistent").unwrap());

        assert!(storage.delete("test_key").unwrap());
        assert!(!storage.delete("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_memory_backend_clear() {
        let storage = MemoryBackend::new();
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();

        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
