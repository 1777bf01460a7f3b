//! In-memory cache backend.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::key::validate as validate_key;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory cache backend.
///
/// Entries are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Contents are lost
/// when the backend is dropped; suitable for single-process deployments and
/// for tests.
///
/// # Examples
///
/// ```
/// use blockcache_cache::backend::{CacheBackend, MemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::with_entries([("a", b"one".to_vec())]);
/// assert!(backend.get("a").await?.is_some());
/// assert_eq!(backend.keys().await, vec!["a".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct MemoryBackend {
    name: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create a memory backend pre-populated with entries.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_entries(entries: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (key, value) in entries {
            let key = key.into();
            if validate_key(&key).is_err() {
                // The panic here is DELIBERATE: pre-populating is for tests and
                // there is no error result to return.
                panic!("MemoryBackend::with_entries: invalid key {key:?}");
            }
            map.insert(key, value.into());
        }
        Self { name: "memory".to_string(), entries: RwLock::new(map) }
    }

    /// Change the name of the memory backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let entries: [(&str, Vec<u8>); 0] = [];
        Self::with_entries(entries)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = validate_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        for key in keys {
            validate_key(key)?;
        }
        let guard = self.entries.read().await;
        Ok(keys.iter().filter_map(|key| guard.get(key).map(|value| (key.clone(), value.clone()))).collect())
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        // Validate everything up front so a bad key can't leave a partial write.
        for (key, _) in entries {
            validate_key(key)?;
        }
        let mut guard = self.entries.write().await;
        for (key, value) in entries {
            guard.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::default();
        backend.set("key", b"hello").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_many_returns_present_only() {
        let backend = MemoryBackend::with_entries([("a", b"1".to_vec()), ("b", b"2".to_vec())]);
        let found = backend.get_many(&["a".to_string(), "c".to_string()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], b"1");
    }

    #[tokio::test]
    async fn test_set_many_rejects_bad_key_without_partial_write() {
        let backend = MemoryBackend::default();
        let entries = vec![("good".to_string(), b"1".to_vec()), ("bad key".to_string(), b"2".to_vec())];
        let err = backend.set_many(&entries).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
        assert!(backend.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::with_entries([("a", b"1".to_vec())]);
        backend.delete("a").await.unwrap();
        backend.delete("a").await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let backend = MemoryBackend::default();
        assert!(backend.get("../escape").await.is_err());
        assert!(backend.set("with space", b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_entries_panics_on_bad_key() {
        MemoryBackend::with_entries([("bad key", b"x".to_vec())]);
    }
}
