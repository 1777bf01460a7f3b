//! Building a block structure from the content store.

use crate::error::{ErrorKind, Result};
use crate::{Block, BlockProvider};
use blockcache_graph::{BlockKey, BlockStructure};
use exn::ResultExt;
use std::collections::{HashSet, VecDeque};
use tracing::instrument;

/// Walk the content store breadth-first from `root` and build the full,
/// unpruned structure.
///
/// Only the `fields` requested by the pipeline are copied onto each block.
/// Blocks shared between several parents are fetched once. A child that the
/// content store lists but can't return is skipped with a warning; a missing
/// root is an error.
///
/// # Errors
/// - [`BlockNotFound`](ErrorKind::BlockNotFound) if `root` doesn't exist.
/// - [`Provider`](ErrorKind::Provider) if the content store fails.
/// - [`Graph`](ErrorKind::Graph) if the content store reports a cycle.
#[instrument(skip_all, fields(root = %root, fields = fields.len()))]
pub async fn build(provider: &dyn BlockProvider, root: &BlockKey, fields: &[String]) -> Result<BlockStructure> {
    let Some(root_block) = provider.get_item(root).await? else {
        exn::bail!(ErrorKind::BlockNotFound(root.clone()));
    };

    let mut seen: HashSet<BlockKey> = HashSet::from([root.clone()]);
    let mut queue: VecDeque<BlockKey> = root_block.children.iter().cloned().collect();
    let mut blocks: Vec<Block> = vec![root_block];
    while let Some(key) = queue.pop_front() {
        if !seen.insert(key.clone()) {
            continue;
        }
        match provider.get_item(&key).await? {
            Some(block) => {
                queue.extend(block.children.iter().filter(|child| !seen.contains(*child)).cloned());
                blocks.push(block);
            },
            None => tracing::warn!(block = %key, "Skipping block missing from content store"),
        }
    }

    let found: HashSet<&BlockKey> = blocks.iter().map(|block| &block.key).collect();
    let mut structure = BlockStructure::new(root.clone());
    for block in &blocks {
        structure.add_block(&block.key);
        for child in block.children.iter().filter(|child| found.contains(child)) {
            structure.add_relation(&block.key, child).or_raise(|| ErrorKind::Graph)?;
        }
        for field in fields {
            if let Some(value) = block.fields.get(field) {
                structure.set_xblock_field(&block.key, field.clone(), value.clone()).or_raise(|| ErrorKind::Graph)?;
            }
        }
    }
    tracing::debug!(blocks = structure.len(), "Built block structure");
    Ok(structure)
}
