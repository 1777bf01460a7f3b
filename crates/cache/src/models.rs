//! Serializable snapshot of a collected block structure.

use crate::error::{Error, ErrorKind};
use blockcache_graph::{BlockKey, BlockStructure, FieldValue};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the snapshot layout changes. Entries written with any
/// other version are unreadable, and therefore cache misses.
pub const FORMAT_VERSION: u32 = 1;

type Namespaced = BTreeMap<String, BTreeMap<String, FieldValue>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    pub root: BlockKey,
    /// Live blocks, sorted by key.
    pub blocks: Vec<BlockSnapshot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transformer_data: Namespaced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub key: BlockKey,
    /// Display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub xblock_fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transformer_fields: Namespaced,
}

impl From<&BlockStructure> for Snapshot {
    fn from(structure: &BlockStructure) -> Self {
        let mut keys: Vec<&BlockKey> = structure.block_keys().collect();
        keys.sort();
        let blocks = keys
            .into_iter()
            .map(|key| {
                let data = structure.block_data(key);
                BlockSnapshot {
                    key: key.clone(),
                    children: structure.get_children(key).to_vec(),
                    xblock_fields: data.map(|d| d.xblock_fields().clone()).unwrap_or_default(),
                    transformer_fields: data.map(|d| d.transformer_fields().clone()).unwrap_or_default(),
                }
            })
            .collect();
        Self {
            format: FORMAT_VERSION,
            root: structure.root().clone(),
            blocks,
            transformer_data: structure.transformer_data().clone(),
        }
    }
}

impl TryFrom<Snapshot> for BlockStructure {
    type Error = Error;

    /// Rebuild a structure, replaying every relation through
    /// [`BlockStructure::add_relation`] so a tampered snapshot can't smuggle
    /// in a cycle.
    fn try_from(snapshot: Snapshot) -> Result<Self, Self::Error> {
        if snapshot.format != FORMAT_VERSION {
            exn::bail!(ErrorKind::InvalidData);
        }
        let mut structure = BlockStructure::new(snapshot.root);
        for block in &snapshot.blocks {
            structure.add_block(block.key.clone());
        }
        for block in snapshot.blocks {
            for child in block.children {
                if !structure.has_block(&child) {
                    exn::bail!(ErrorKind::InvalidData);
                }
                structure.add_relation(block.key.clone(), child).or_raise(|| ErrorKind::InvalidData)?;
            }
            for (field, value) in block.xblock_fields {
                structure.set_xblock_field(&block.key, field, value).or_raise(|| ErrorKind::InvalidData)?;
            }
            for (transformer, fields) in block.transformer_fields {
                for (field, value) in fields {
                    structure
                        .set_transformer_block_field(&block.key, &transformer, field, value)
                        .or_raise(|| ErrorKind::InvalidData)?;
                }
            }
        }
        for (transformer, fields) in snapshot.transformer_data {
            for (field, value) in fields {
                structure.set_transformer_data(&transformer, field, value);
            }
        }
        Ok(structure)
    }
}
