//! Lazy traversals over a [`BlockStructure`].

use crate::{BlockKey, BlockStructure};
use std::collections::{HashMap, HashSet};

type Filter<'a> = Box<dyn Fn(&BlockKey) -> bool + 'a>;

/// Topological (parents-first) traversal of the blocks reachable from a
/// starting block.
///
/// A block is only visited once all of its parents *inside the traversed
/// subgraph* have been visited, so multi-parent blocks appear exactly once and
/// always after every one of their ancestors. Siblings are visited in display
/// order, depth-first.
///
/// Created by [`BlockStructure::topological_traversal`]; every call creates a
/// fresh traversal, so a traversal can be restarted simply by asking again.
///
/// # Filtering
/// Blocks rejected by [`filter_blocks`](Self::filter_blocks) are not yielded. By default
/// their descendants are only yielded when reachable through another yielded
/// parent; [`yield_descendants_of_unyielded`](Self::yield_descendants_of_unyielded)
/// lifts that restriction.
pub struct Traversal<'a> {
    structure: &'a BlockStructure,
    start: Option<&'a BlockKey>,
    stack: Vec<&'a BlockKey>,
    pending: HashMap<&'a BlockKey, usize>,
    yielded: HashSet<&'a BlockKey>,
    filter: Option<Filter<'a>>,
    yield_descendants_of_unyielded: bool,
}

impl<'a> Traversal<'a> {
    pub(crate) fn topological(structure: &'a BlockStructure, start: &BlockKey) -> Self {
        let start = structure.live_key(start);
        let mut pending: HashMap<&'a BlockKey, usize> = HashMap::new();
        if let Some(start) = start {
            // Count incoming edges within the reachable subgraph only; parents
            // outside of it must not hold their children back forever.
            let mut seen = HashSet::from([start]);
            let mut walk = vec![start];
            while let Some(key) = walk.pop() {
                for child in structure.get_children(key) {
                    *pending.entry(child).or_insert(0) += 1;
                    if seen.insert(child) {
                        walk.push(child);
                    }
                }
            }
        }
        Self {
            structure,
            start,
            stack: start.into_iter().collect(),
            pending,
            yielded: HashSet::new(),
            filter: None,
            yield_descendants_of_unyielded: false,
        }
    }

    /// Only yield blocks for which `filter` returns `true`.
    pub fn filter_blocks(mut self, filter: impl Fn(&BlockKey) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Also yield descendants of blocks that were rejected by the filter.
    pub fn yield_descendants_of_unyielded(mut self, enabled: bool) -> Self {
        self.yield_descendants_of_unyielded = enabled;
        self
    }

    fn is_reachable_through_yielded(&self, key: &BlockKey) -> bool {
        self.yield_descendants_of_unyielded
            || self.start == Some(key)
            || self.structure.get_parents(key).iter().any(|parent| self.yielded.contains(parent))
    }
}

impl<'a> Iterator for Traversal<'a> {
    type Item = &'a BlockKey;

    fn next(&mut self) -> Option<Self::Item> {
        let structure = self.structure;
        while let Some(key) = self.stack.pop() {
            let accepted = self.filter.as_ref().is_none_or(|filter| filter(key)) && self.is_reachable_through_yielded(key);
            // Reverse so that the first child ends up on top of the stack.
            for child in structure.get_children(key).iter().rev() {
                if let Some(count) = self.pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        self.stack.push(child);
                    }
                }
            }
            if accepted {
                self.yielded.insert(key);
                return Some(key);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::{DAG_CHILDREN_MAP, LINEAR_CHILDREN_MAP, SIMPLE_CHILDREN_MAP, from_children_map};
    use crate::BlockKey;
    use rstest::rstest;

    fn keys(ids: &[usize]) -> Vec<BlockKey> {
        ids.iter().copied().map(BlockKey::from).collect()
    }

    #[rstest]
    #[case(SIMPLE_CHILDREN_MAP, &[0, 1, 3, 4, 2])]
    #[case(LINEAR_CHILDREN_MAP, &[0, 1, 2, 3])]
    #[case(DAG_CHILDREN_MAP, &[0, 1, 2, 3, 5, 6, 4])]
    fn test_topological_order(#[case] children_map: &[&[usize]], #[case] expected: &[usize]) {
        let structure = from_children_map(children_map);
        let visited: Vec<BlockKey> = structure.topological_traversal().cloned().collect();
        assert_eq!(visited, keys(expected));
    }

    #[rstest]
    #[case(SIMPLE_CHILDREN_MAP)]
    #[case(LINEAR_CHILDREN_MAP)]
    #[case(DAG_CHILDREN_MAP)]
    fn test_parents_precede_children(#[case] children_map: &[&[usize]]) {
        let structure = from_children_map(children_map);
        let order: Vec<&BlockKey> = structure.topological_traversal().collect();
        assert_eq!(order.len(), children_map.len());
        for (position, key) in order.iter().enumerate() {
            for parent in structure.get_parents(key) {
                let parent_position = order.iter().position(|k| *k == parent).unwrap();
                assert!(parent_position < position, "{parent} should precede {key}");
            }
        }
    }

    #[test]
    fn test_traversal_is_restartable() {
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let first: Vec<_> = structure.topological_traversal().collect();
        let second: Vec<_> = structure.topological_traversal().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_traversal_from_inner_block_ignores_outside_parents() {
        // Block 3 has parents 1 and 2, only 2 is inside the subgraph.
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let visited: Vec<BlockKey> = structure.topological_traversal_from(&BlockKey::from(2)).cloned().collect();
        assert_eq!(visited, keys(&[2, 3, 5, 6, 4]));
    }

    #[test]
    fn test_traversal_from_unknown_block_is_empty() {
        let structure = from_children_map(SIMPLE_CHILDREN_MAP);
        assert_eq!(structure.topological_traversal_from(&BlockKey::from(99)).count(), 0);
    }

    #[test]
    fn test_filter_skips_exclusive_descendants() {
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let visited: Vec<BlockKey> = structure
            .topological_traversal()
            .filter_blocks(|key| key.as_str() != "2")
            .cloned()
            .collect();
        // 4 is only reachable through 2; 3 is also reachable through 1.
        assert_eq!(visited, keys(&[0, 1, 3, 5, 6]));
    }

    #[test]
    fn test_filter_can_yield_descendants_of_unyielded() {
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let visited: Vec<BlockKey> = structure
            .topological_traversal()
            .filter_blocks(|key| key.as_str() != "2")
            .yield_descendants_of_unyielded(true)
            .cloned()
            .collect();
        assert_eq!(visited, keys(&[0, 1, 3, 5, 6, 4]));
    }

    #[test]
    fn test_post_order_children_first() {
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let order: Vec<&BlockKey> = structure.post_order_traversal().collect();
        assert_eq!(order.last(), Some(&&BlockKey::from(0)));
        for (position, key) in order.iter().enumerate() {
            for child in structure.get_children(key) {
                let child_position = order.iter().position(|k| *k == child).unwrap();
                assert!(child_position < position, "{child} should precede {key}");
            }
        }
    }

    #[test]
    fn test_post_order_from_subtree() {
        let structure = from_children_map(DAG_CHILDREN_MAP);
        let order: Vec<BlockKey> = structure.post_order_traversal_from(&BlockKey::from(2)).cloned().collect();
        assert_eq!(order.len(), 5);
        assert_eq!(order.last(), Some(&BlockKey::from(2)));
        assert!(!order.contains(&BlockKey::from(1)));
    }
}
