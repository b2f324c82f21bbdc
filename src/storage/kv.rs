//! Key-value backends the catalog snapshots are written to

use std::collections::HashMap;

use crate::storage::error::StorageError;

/// Host key-value store holding whole JSON snapshots under fixed keys
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrites the value under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Process-local store, gone when dropped
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("songs")?, None);

        store.set("songs", "[]")?;
        store.set("songs", "[1]")?;
        assert_eq!(store.get("songs")?, Some("[1]".to_string()));

        store.remove("songs")?;
        store.remove("songs")?;
        assert_eq!(store.get("songs")?, None);

        Ok(())
    }

    #[test]
    fn test_boxed_store_delegates() -> anyhow::Result<()> {
        let mut store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.set("audioData", "{}")?;
        assert_eq!(store.get("audioData")?, Some("{}".to_string()));
        Ok(())
    }
}
