use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::BlobStore;
use super::error::StorageResult;

/// Process-local blob store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_replaces_whole_value() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("k").expect("get"), None);

        store.put("k", "one").expect("put");
        store.put("k", "two").expect("put");

        assert_eq!(store.get("k").expect("get").as_deref(), Some("two"));
    }
}
