use crate::{circuit::Leaf, coverage::LeafCoverage};
use fnv::FnvHashMap;

/// `LeafIndex` maps each (tree, leaf) pair that survived coverage estimation to its dense global index, `f_idx`, which starts at 1.
#[derive(Debug, Clone, Default)]
pub(crate) struct LeafIndex {
	trees: Vec<FnvHashMap<usize, usize>>,
}

impl LeafIndex {
	pub fn f_idx(&self, tree_index: usize, leaf_index: usize) -> Option<usize> {
		self.trees
			.get(tree_index)
			.and_then(|leaves| leaves.get(&leaf_index))
			.copied()
	}

	pub fn n_leaves(&self, tree_index: usize) -> usize {
		self.trees
			.get(tree_index)
			.map(|leaves| leaves.len())
			.unwrap_or(0)
	}
}

/// Assign every leaf a global index in (tree, leaf) order. Two trees never share an index, even if their leaves cover the same region.
pub(crate) fn index_leaves(n_trees: usize, mut coverage: Vec<LeafCoverage>) -> (Vec<Leaf>, LeafIndex) {
	coverage.sort_by_key(|leaf| (leaf.tree_index, leaf.leaf_index));
	coverage.dedup_by_key(|leaf| (leaf.tree_index, leaf.leaf_index));
	let mut index = LeafIndex {
		trees: vec![FnvHashMap::default(); n_trees],
	};
	let leaves = coverage
		.into_iter()
		.enumerate()
		.map(|(position, leaf)| {
			let f_idx = position + 1;
			index.trees[leaf.tree_index].insert(leaf.leaf_index, f_idx);
			Leaf {
				f_idx,
				tree: leaf.tree_index,
				leaf: leaf.leaf_index,
				coverage: leaf.coverage,
				bounds: leaf.bounds,
			}
		})
		.collect();
	(leaves, index)
}

#[test]
fn test_index_leaves() {
	let leaf = |tree_index, leaf_index| LeafCoverage {
		tree_index,
		leaf_index,
		coverage: 0.5,
		bounds: Vec::new(),
	};
	let (leaves, index) = index_leaves(2, vec![leaf(1, 4), leaf(0, 2), leaf(1, 3), leaf(0, 1)]);
	let keys: Vec<(usize, usize, usize)> = leaves
		.iter()
		.map(|leaf| (leaf.f_idx, leaf.tree, leaf.leaf))
		.collect();
	insta::assert_debug_snapshot!(keys, @r###"
 [
     (
         1,
         0,
         1,
     ),
     (
         2,
         0,
         2,
     ),
     (
         3,
         1,
         3,
     ),
     (
         4,
         1,
         4,
     ),
 ]
 "###);
	assert_eq!(index.f_idx(1, 3), Some(3));
	assert_eq!(index.f_idx(1, 1), None);
	assert_eq!(index.n_leaves(0), 2);
}
