//! Read-only cache backend.
//!
//! Wraps another backend, serving reads from it while dropping every write
//! operation and still indicating success on return.

use crate::backend::CacheBackend;
use crate::{BackendHandle, error::Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only cache backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event).
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CacheBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.inner.get_many(keys).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        tracing::info!(backend = self.name(), key, bytes = value.len(), "Skipping write during read-only mode");
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        tracing::info!(backend = self.name(), entries = entries.len(), "Skipping batch write during read-only mode");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::info!(backend = self.name(), key, "Skipping delete during read-only mode");
        Ok(())
    }
}
