//! The block structure: a DAG of block keys plus collected field data.

use crate::error::{ErrorKind, Result};
use crate::traversal::Traversal;
use crate::{BlockData, BlockKey, FieldValue};
use exn::ResultExt;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

static NO_PARENTS: BTreeSet<BlockKey> = BTreeSet::new();

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Relations {
    /// Display order.
    children: Vec<BlockKey>,
    parents: BTreeSet<BlockKey>,
}

/// A directed acyclic graph of content blocks rooted at a single block.
///
/// The structure holds the parent/child adjacency of every block reachable
/// from the root (as reported by the content store), and sparse field data
/// per block. Blocks may have more than one parent (shared library content)
/// but cycles are rejected, as is giving the root a parent.
///
/// Children and parents are always updated together, so for every pair of
/// blocks `c ∈ get_children(p) ⇔ p ∈ get_parents(c)`.
///
/// # Removal
/// [`remove_block`](Self::remove_block) detaches a block from its parents and
/// children but does **not** cascade: descendants that are now unreachable
/// stay in the structure until a transformer calls
/// [`prune_unreachable`](Self::prune_unreachable). Removed keys are remembered
/// so that stale references held elsewhere are answered with "absent".
///
/// # Copying
/// `Clone` is a deep copy. Per-viewer transforms must always run against a
/// clone, never against a structure shared with other requests.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStructure {
    root: BlockKey,
    relations: HashMap<BlockKey, Relations>,
    removed: HashSet<BlockKey>,
    block_data: HashMap<BlockKey, BlockData>,
    /// Structure-wide data, keyed by transformer name then field name.
    transformer_data: BTreeMap<String, BTreeMap<String, FieldValue>>,
}

impl BlockStructure {
    /// Create a structure containing only the root block.
    pub fn new(root: impl Into<BlockKey>) -> Self {
        let root = root.into();
        let mut relations = HashMap::new();
        relations.insert(root.clone(), Relations::default());
        Self {
            root,
            relations,
            removed: HashSet::new(),
            block_data: HashMap::new(),
            transformer_data: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &BlockKey {
        &self.root
    }

    /// Number of blocks currently in the structure (removed blocks excluded).
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// A structure always contains at least its root.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// All blocks currently in the structure, in no particular order.
    pub fn block_keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.relations.keys()
    }

    pub fn has_block(&self, key: &BlockKey) -> bool {
        self.relations.contains_key(key)
    }

    /// Whether the block was part of the structure but has since been removed.
    pub fn is_removed(&self, key: &BlockKey) -> bool {
        self.removed.contains(key)
    }

    pub(crate) fn live_key(&self, key: &BlockKey) -> Option<&BlockKey> {
        self.relations.get_key_value(key).map(|(key, _)| key)
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Register a block without any relations.
    ///
    /// Returns `false` if the block was already part of the structure.
    pub fn add_block(&mut self, key: impl Into<BlockKey>) -> bool {
        let key = key.into();
        self.removed.remove(&key);
        if self.relations.contains_key(&key) {
            return false;
        }
        self.relations.insert(key, Relations::default());
        true
    }

    /// Add `child` to the end of `parent`'s children, registering either
    /// block if it isn't yet part of the structure.
    ///
    /// Adding a relation that already exists is a no-op. The relation is
    /// rejected, leaving the structure untouched, when it would:
    /// - make a block its own parent ([`ErrorKind::SelfLoop`]),
    /// - give the root a parent ([`ErrorKind::RootParent`]), or
    /// - close a cycle, i.e. `parent` is already reachable from `child`
    ///   ([`ErrorKind::Cycle`]).
    pub fn add_relation(&mut self, parent: impl Into<BlockKey>, child: impl Into<BlockKey>) -> Result<()> {
        let (parent, child) = (parent.into(), child.into());
        if parent == child {
            exn::bail!(ErrorKind::SelfLoop(child));
        }
        if child == self.root {
            exn::bail!(ErrorKind::RootParent(child));
        }
        if self.is_reachable(&child, &parent) {
            exn::bail!(ErrorKind::Cycle { parent, child });
        }
        self.removed.remove(&parent);
        self.removed.remove(&child);
        let relations = self.relations.entry(parent.clone()).or_default();
        if !relations.children.contains(&child) {
            relations.children.push(child.clone());
        }
        self.relations.entry(child).or_default().parents.insert(parent);
        Ok(())
    }

    fn is_reachable(&self, from: &BlockKey, to: &BlockKey) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(key) = stack.pop() {
            if key == to {
                return true;
            }
            if seen.insert(key) {
                stack.extend(self.get_children(key));
            }
        }
        false
    }

    /// Children of a block in display order; empty if the block is unknown.
    pub fn get_children(&self, key: &BlockKey) -> &[BlockKey] {
        self.relations.get(key).map(|relations| relations.children.as_slice()).unwrap_or_default()
    }

    /// Parents of a block; empty if the block is unknown.
    pub fn get_parents(&self, key: &BlockKey) -> &BTreeSet<BlockKey> {
        self.relations.get(key).map_or(&NO_PARENTS, |relations| &relations.parents)
    }

    /// Remove a block, detaching it from all of its parents and children.
    ///
    /// Descendants are kept even if this leaves them unreachable. Returns
    /// `false` if the block was not part of the structure (including when it
    /// was already removed).
    pub fn remove_block(&mut self, key: &BlockKey) -> Result<bool> {
        if *key == self.root {
            exn::bail!(ErrorKind::RootRemoval(key.clone()));
        }
        Ok(self.detach(key))
    }

    fn detach(&mut self, key: &BlockKey) -> bool {
        let Some(relations) = self.relations.remove(key) else {
            return false;
        };
        for parent in &relations.parents {
            if let Some(parent) = self.relations.get_mut(parent) {
                parent.children.retain(|child| child != key);
            }
        }
        for child in &relations.children {
            if let Some(child) = self.relations.get_mut(child) {
                child.parents.remove(key);
            }
        }
        self.block_data.remove(key);
        self.removed.insert(key.clone());
        true
    }

    /// Remove every block (except the root) matching `condition`.
    ///
    /// Returns the removed keys in topological order. Like
    /// [`remove_block`](Self::remove_block), removal does not cascade.
    pub fn remove_block_if(&mut self, condition: impl Fn(&Self, &BlockKey) -> bool) -> Vec<BlockKey> {
        let mut matching: Vec<BlockKey> = self
            .topological_traversal()
            .filter(|key| **key != self.root && condition(self, key))
            .cloned()
            .collect();
        // Blocks that are already unreachable from the root are still blocks.
        let mut unreachable: Vec<BlockKey> = self.unreachable().filter(|key| condition(self, key)).cloned().collect();
        unreachable.sort();
        matching.append(&mut unreachable);
        for key in &matching {
            self.detach(key);
        }
        matching
    }

    fn unreachable(&self) -> impl Iterator<Item = &BlockKey> {
        let reachable: HashSet<&BlockKey> = self.topological_traversal().collect();
        self.relations.keys().filter(move |key| !reachable.contains(key))
    }

    /// Remove every block that can no longer be reached from the root.
    ///
    /// Returns the removed keys, sorted.
    pub fn prune_unreachable(&mut self) -> Vec<BlockKey> {
        let mut unreachable: Vec<BlockKey> = self.unreachable().cloned().collect();
        unreachable.sort();
        for key in &unreachable {
            self.detach(key);
        }
        if !unreachable.is_empty() {
            tracing::debug!(root = %self.root, pruned = unreachable.len(), "Pruned unreachable blocks");
        }
        unreachable
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Parents-first traversal of every block reachable from the root.
    pub fn topological_traversal(&self) -> Traversal<'_> {
        Traversal::topological(self, &self.root)
    }

    /// Parents-first traversal of every block reachable from `start`.
    pub fn topological_traversal_from(&self, start: &BlockKey) -> Traversal<'_> {
        Traversal::topological(self, start)
    }

    /// Children-first traversal of every block reachable from the root, for
    /// bottom-up aggregation.
    pub fn post_order_traversal(&self) -> std::iter::Rev<std::vec::IntoIter<&BlockKey>> {
        self.post_order_traversal_from(&self.root)
    }

    /// Children-first traversal of every block reachable from `start`.
    pub fn post_order_traversal_from(&self, start: &BlockKey) -> std::iter::Rev<std::vec::IntoIter<&BlockKey>> {
        self.topological_traversal_from(start).collect::<Vec<_>>().into_iter().rev()
    }

    // =========================================================================
    // Field Data
    // =========================================================================

    /// All field data held for a block, if any has been set.
    pub fn block_data(&self, key: &BlockKey) -> Option<&BlockData> {
        self.block_data.get(key)
    }

    fn block_data_mut(&mut self, key: &BlockKey) -> Result<&mut BlockData> {
        if !self.has_block(key) {
            exn::bail!(ErrorKind::UnknownBlock(key.clone()));
        }
        Ok(self.block_data.entry(key.clone()).or_default())
    }

    pub fn set_xblock_field(
        &mut self,
        key: &BlockKey,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        self.block_data_mut(key)?.xblock_fields.insert(field.into(), value.into());
        Ok(())
    }

    pub fn xblock_field(&self, key: &BlockKey, field: &str) -> Option<&FieldValue> {
        self.block_data.get(key)?.xblock_fields.get(field)
    }

    /// Read an xblock field, falling back to `default` when it was never
    /// collected for this block.
    pub fn get_xblock_field(&self, key: &BlockKey, field: &str, default: impl Into<FieldValue>) -> FieldValue {
        match self.xblock_field(key, field) {
            Some(value) => value.clone(),
            None => default.into(),
        }
    }

    /// Read an xblock field as a concrete type.
    ///
    /// Returns `Ok(None)` when the field is absent, and
    /// [`ErrorKind::Field`] when it is present with a different shape.
    pub fn xblock_field_as<T: DeserializeOwned>(&self, key: &BlockKey, field: &str) -> Result<Option<T>> {
        self.xblock_field(key, field)
            .map(|value| {
                serde_json::from_value(value.clone()).or_raise(|| ErrorKind::Field {
                    block: key.clone(),
                    field: field.to_string(),
                })
            })
            .transpose()
    }

    /// Store structure-wide data under a transformer's namespace.
    pub fn set_transformer_data(&mut self, transformer: &str, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.transformer_data.entry(transformer.to_string()).or_default().insert(field.into(), value.into());
    }

    pub fn get_transformer_data(&self, transformer: &str, field: &str) -> Option<&FieldValue> {
        self.transformer_data.get(transformer)?.get(field)
    }

    /// Every structure-wide value, keyed by transformer name then field name.
    pub fn transformer_data(&self) -> &BTreeMap<String, BTreeMap<String, FieldValue>> {
        &self.transformer_data
    }

    /// Store per-block data under a transformer's namespace.
    pub fn set_transformer_block_field(
        &mut self,
        key: &BlockKey,
        transformer: &str,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        self.block_data_mut(key)?
            .transformer_fields
            .entry(transformer.to_string())
            .or_default()
            .insert(field.into(), value.into());
        Ok(())
    }

    pub fn get_transformer_block_field(&self, key: &BlockKey, transformer: &str, field: &str) -> Option<&FieldValue> {
        self.block_data.get(key)?.transformer_fields.get(transformer)?.get(field)
    }

    pub fn remove_transformer_block_field(&mut self, key: &BlockKey, transformer: &str, field: &str) -> Option<FieldValue> {
        let fields = self.block_data.get_mut(key)?.transformer_fields.get_mut(transformer)?;
        let value = fields.remove(field);
        if fields.is_empty() {
            self.block_data.get_mut(key)?.transformer_fields.remove(transformer);
        }
        value
    }
}
