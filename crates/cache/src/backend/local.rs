//! Local filesystem cache backend.
//!
//! One file per key, all in a single directory, accessed via `tokio::fs`.

use crate::backend::CacheBackend;
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Local filesystem cache backend.
///
/// Writes go to a hidden temporary file first and are renamed into place, so
/// readers never observe a half-written entry. Keys can't start with `.`, so
/// temporary files never collide with entries.
///
/// # Examples
///
/// ```no_run
/// use blockcache_cache::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/var/cache/blockcache")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
    writes: AtomicU64,
}

impl LocalBackend {
    /// Create a new local filesystem backend, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Io(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::Io(root));
            }
        } else {
            // Non-async: happens once at startup, and keeps the constructor sync.
            sync_create_dir(&root).or_raise(|| ErrorKind::Io(root.clone()))?;
        }
        Ok(Self { name: name.into(), root, writes: AtomicU64::new(0) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    /// Keys may already use the whole file name length, so temporary files
    /// are named after a short hash of the key instead.
    fn temp_path(&self, key: &str) -> PathBuf {
        let n = self.writes.fetch_add(1, Ordering::Relaxed);
        let hash = blake3::hash(key.as_bytes()).to_hex();
        self.root.join(format!(".{}.{}.{n}.tmp", &hash[..16], std::process::id()))
    }
}

#[async_trait]
impl CacheBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).or_raise(|| ErrorKind::Io(path)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;
        let temp = self.temp_path(key);
        fs::write(&temp, value).await.or_raise(|| ErrorKind::Io(temp.clone()))?;
        if let Err(err) = fs::rename(&temp, &path).await {
            // Best effort; the original error is the one worth reporting.
            let _ = fs::remove_file(&temp).await;
            return Err(err).or_raise(|| ErrorKind::Io(path));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).or_raise(|| ErrorKind::Io(path)),
        }
    }
}
