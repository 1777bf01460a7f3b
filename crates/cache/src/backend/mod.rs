//! Cache backend trait and implementations.
//!
//! This module defines the `CacheBackend` trait: a plain key/value store for
//! byte blobs. Anything that can get, set and delete by string key (memcached,
//! Redis, a database table) can sit behind it.

mod local;
mod memory;
mod ro;

pub use self::local::LocalBackend;
pub use self::memory::MemoryBackend;
pub use self::ro::ReadOnlyBackend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Unified interface for cache backends.
///
/// Every call is independent and atomic per key; the cache layer never relies
/// on cross-key transactions. Keys are validated with
/// [`validate_key`](crate::validate_key) by implementations.
///
/// # Examples
///
/// ```
/// use blockcache_cache::backend::{CacheBackend, MemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::default();
/// backend.set("course.gen", b"0").await?;
/// assert_eq!(backend.get("course.gen").await?, Some(b"0".to_vec()));
/// backend.delete("course.gen").await?;
/// assert_eq!(backend.get("course.gen").await?, None);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Fetch a value. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch many values at once. Only keys that are present appear in the
    /// result.
    ///
    /// The default implementation calls [`get()`](Self::get) for each key.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store many values at once.
    ///
    /// Each entry is written independently: one failing entry does not stop
    /// the others from being written. The first failure is returned after
    /// every entry has been attempted.
    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for (key, value) in entries {
            if let Err(err) = self.set(key, value).await {
                tracing::warn!(backend = self.name(), key = %key, error = ?err, "Failed to write cache entry");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove a value. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
