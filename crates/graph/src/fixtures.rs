//! Children-map fixtures for tests.
//!
//! A children map describes a structure by position: entry `n` lists the
//! children of block `n`, and block `0` is the root.
//!
//! Do NOT apply `#[cfg(test)]` to this module alone, so that other crates can
//! also use it in their tests (enable the `mock` feature from
//! dev-dependencies).

use crate::{BlockKey, BlockStructure};
use std::collections::BTreeSet;

/// ```text
///     0
///    / \
///   1   2
///  / \
/// 3   4
/// ```
pub const SIMPLE_CHILDREN_MAP: &[&[usize]] = &[&[1, 2], &[3, 4], &[], &[], &[]];

/// ```text
/// 0 - 1 - 2 - 3
/// ```
pub const LINEAR_CHILDREN_MAP: &[&[usize]] = &[&[1], &[2], &[3], &[]];

/// Block 3 has two parents.
///
/// ```text
///     0
///    / \
///   1   2
///    \ / \
///     3   4
///    / \
///   5   6
/// ```
pub const DAG_CHILDREN_MAP: &[&[usize]] = &[&[1, 2], &[3], &[3, 4], &[5, 6], &[], &[], &[]];

/// Build a structure rooted at block `0` from a children map.
///
/// Panics if the map describes something that isn't a DAG. If test setup is
/// wrong, then test should not pass.
pub fn from_children_map(children_map: &[&[usize]]) -> BlockStructure {
    let mut structure = BlockStructure::new(0);
    for (parent, children) in children_map.iter().enumerate() {
        structure.add_block(parent);
        for child in children.iter().copied() {
            if let Err(err) = structure.add_relation(parent, child) {
                panic!("from_children_map: invalid relation {parent} -> {child}: {err:?}");
            }
        }
    }
    structure
}

/// Invert a children map.
pub fn parents_map(children_map: &[&[usize]]) -> Vec<Vec<usize>> {
    let mut parents = vec![Vec::new(); children_map.len()];
    for (parent, children) in children_map.iter().enumerate() {
        for child in children.iter().copied() {
            parents[child].push(parent);
        }
    }
    parents
}

/// Assert that a structure has exactly the relations of a children map.
///
/// Blocks listed in `missing` must be absent from the structure; they keep
/// their positional entry in the children map but their own relations are
/// not checked.
pub fn assert_children_map(structure: &BlockStructure, children_map: &[&[usize]], missing: &[usize]) {
    let parents_map = parents_map(children_map);
    for (block, children) in children_map.iter().enumerate() {
        let key = BlockKey::from(block);
        let is_missing = missing.contains(&block);
        assert_eq!(
            structure.has_block(&key),
            !is_missing,
            "expected presence of block {block} to match its absence from missing blocks"
        );
        if is_missing {
            continue;
        }
        let actual: BTreeSet<&BlockKey> = structure.get_children(&key).iter().collect();
        let expected: Vec<BlockKey> = children.iter().copied().map(BlockKey::from).collect();
        assert_eq!(actual, expected.iter().collect::<BTreeSet<_>>(), "children of block {block}");
        let actual: BTreeSet<&BlockKey> = structure.get_parents(&key).iter().collect();
        let expected: Vec<BlockKey> = parents_map[block].iter().copied().map(BlockKey::from).collect();
        assert_eq!(actual, expected.iter().collect::<BTreeSet<_>>(), "parents of block {block}");
    }
}
