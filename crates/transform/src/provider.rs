//! The content store boundary.

use crate::error::Result;
use async_trait::async_trait;
use blockcache_graph::{BlockKey, FieldValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A block as reported by the content store.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub key: BlockKey,
    /// Raw field values; only the ones requested by transformers are copied
    /// into a structure.
    pub fields: BTreeMap<String, FieldValue>,
    /// Display order.
    pub children: Vec<BlockKey>,
}

impl Block {
    pub fn new(key: impl Into<BlockKey>) -> Self {
        Self { key: key.into(), fields: BTreeMap::new(), children: Vec::new() }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = impl Into<BlockKey>>) -> Self {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Source of truth for course content.
///
/// Failures should be raised as
/// [`ErrorKind::Provider`](crate::error::ErrorKind::Provider); they are
/// surfaced to the caller unchanged, no retries are attempted.
#[async_trait]
pub trait BlockProvider: Send + Sync {
    /// Fetch one block. A key the store doesn't know is `Ok(None)`.
    async fn get_item(&self, key: &BlockKey) -> Result<Option<Block>>;

    /// A stamp that changes whenever anything in the subtree rooted at `root`
    /// changes (e.g. the course's last publish).
    async fn content_version(&self, root: &BlockKey) -> Result<String>;
}

pub type ProviderHandle = Arc<dyn BlockProvider + Send + Sync>;
