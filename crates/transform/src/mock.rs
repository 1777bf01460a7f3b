//! Test doubles for the content store and transformers.
//!
//! Do NOT apply `#[cfg(test)]` to this module alone, so that other crates can
//! also use it in their tests (enable the `mock` feature from
//! dev-dependencies).

use crate::error::{ErrorKind, Result};
use crate::{Block, BlockProvider, Transformer};
use async_trait::async_trait;
use blockcache_graph::{BlockKey, BlockStructure, FieldValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory content store.
///
/// Counts [`get_item`](BlockProvider::get_item) calls, so tests can tell
/// whether a structure was rebuilt or served from the cache.
///
/// # Examples
///
/// ```
/// use blockcache_graph::BlockKey;
/// use blockcache_transform::BlockProvider;
/// use blockcache_transform::mock::MockProvider;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // 0 -> 1 -> 2
/// let provider = MockProvider::from_children_map(&[&[1], &[2], &[]]);
/// let root = provider.get_item(&BlockKey::from(0)).await?.unwrap();
/// assert_eq!(root.children, vec![BlockKey::from(1)]);
/// assert_eq!(provider.get_item_call_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockProvider {
    blocks: HashMap<BlockKey, Block>,
    content_version: RwLock<String>,
    failing: HashSet<BlockKey>,
    get_item_calls: AtomicUsize,
}

impl MockProvider {
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|block| (block.key.clone(), block)).collect(),
            content_version: RwLock::new("1".to_string()),
            failing: HashSet::new(),
            get_item_calls: AtomicUsize::new(0),
        }
    }

    /// One block per entry of the children map, keyed by position.
    pub fn from_children_map(children_map: &[&[usize]]) -> Self {
        Self::with_blocks(
            children_map
                .iter()
                .enumerate()
                .map(|(key, children)| Block::new(key).with_children(children.iter().copied())),
        )
    }

    /// Set a field on a block.
    ///
    /// Panics if the block doesn't exist. If test setup is wrong, then test
    /// should not pass.
    pub fn with_field(mut self, key: impl Into<BlockKey>, field: &str, value: impl Into<FieldValue>) -> Self {
        let key = key.into();
        let Some(block) = self.blocks.get_mut(&key) else {
            panic!("MockProvider::with_field: unknown block {key}");
        };
        block.fields.insert(field.to_string(), value.into());
        self
    }

    /// Make every `get_item` for `key` fail with a provider error.
    pub fn with_failing_block(mut self, key: impl Into<BlockKey>) -> Self {
        self.failing.insert(key.into());
        self
    }

    /// Simulate a publish.
    pub async fn set_content_version(&self, version: impl Into<String>) {
        *self.content_version.write().await = version.into();
    }

    pub fn get_item_call_count(&self) -> usize {
        self.get_item_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockProvider for MockProvider {
    async fn get_item(&self, key: &BlockKey) -> Result<Option<Block>> {
        self.get_item_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(key) {
            exn::bail!(ErrorKind::Provider);
        }
        Ok(self.blocks.get(key).cloned())
    }

    async fn content_version(&self, _root: &BlockKey) -> Result<String> {
        Ok(self.content_version.read().await.clone())
    }
}

/// A transformer that does nothing, with a configurable name and version.
pub struct MockTransformer {
    name: String,
    version: u32,
}

impl MockTransformer {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version }
    }
}

impl<U> Transformer<U> for MockTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn transform(&self, _usage_info: &U, _structure: &mut BlockStructure) -> Result<()> {
        Ok(())
    }
}
