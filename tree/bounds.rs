use crate::{BranchNode, Node, PassThroughNode, Tree};
use ndarray::prelude::*;
use std::f64::{INFINITY, NEG_INFINITY};

/// An `Interval` bounds a single feature. A side that is unconstrained is infinite. Intervals produced by splits are open below and closed above, because a split sends values `<= split_value` left and values `> split_value` right.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Interval {
	pub min: f64,
	pub max: f64,
}

impl Interval {
	pub const UNBOUNDED: Interval = Interval {
		min: NEG_INFINITY,
		max: INFINITY,
	};

	pub fn new(min: f64, max: f64) -> Self {
		Self { min, max }
	}

	pub fn is_finite(&self) -> bool {
		self.min.is_finite() && self.max.is_finite()
	}

	pub fn midpoint(&self) -> f64 {
		(self.min + self.max) / 2.0
	}

	pub fn is_subset_of(&self, other: &Interval) -> bool {
		self.min >= other.min && self.max <= other.max
	}
}

impl Default for Interval {
	fn default() -> Self {
		Self::UNBOUNDED
	}
}

/// The bounding box of every node in a tree, with shape (n_nodes, n_features).
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBounds {
	pub bounds: Array2<Interval>,
}

impl TreeBounds {
	pub fn node(&self, node_index: usize) -> ArrayView1<Interval> {
		self.bounds.row(node_index)
	}
}

/**
Compute the bounding box of every node in `tree`, given the bounding box of the root.

Each branch copies its box to both children and then narrows the split feature: the left child's upper bound and the right child's lower bound become the split value. A pass through node copies its box to its child unchanged. Boxes never widen on the way down, and a split value outside of its node's box is clamped to the box, so the child on the far side of the split gets a box of zero width rather than an inverted one.
*/
pub fn compute_bounds(tree: &Tree, root: &[Interval]) -> TreeBounds {
	let n_features = root.len();
	let mut bounds = Array::from_elem((tree.n_nodes(), n_features), Interval::UNBOUNDED);
	bounds.row_mut(0).assign(&ArrayView1::from(root));
	// Child ids are always greater than their parent's id, so every parent is finalized before its children are visited.
	for (node_index, node) in tree.nodes.iter().enumerate() {
		match node {
			Node::Branch(BranchNode {
				feature_index,
				split_value,
				left_child_index,
				right_child_index,
				..
			}) => {
				let parent = bounds.row(node_index).to_owned();
				bounds.row_mut(*left_child_index).assign(&parent);
				bounds.row_mut(*right_child_index).assign(&parent);
				let split = parent[*feature_index];
				let split_value = split_value.max(split.min).min(split.max);
				bounds[[*left_child_index, *feature_index]].max = split_value;
				bounds[[*right_child_index, *feature_index]].min = split_value;
			}
			Node::PassThrough(PassThroughNode { child_index }) => {
				let parent = bounds.row(node_index).to_owned();
				bounds.row_mut(*child_index).assign(&parent);
			}
			Node::Leaf => {}
		}
	}
	TreeBounds { bounds }
}

#[test]
fn test_compute_bounds() {
	let tree = Tree::from_arrays(0, crate::stump_arrays(), 2).unwrap();
	let bounds = compute_bounds(&tree, &[Interval::UNBOUNDED; 2]);
	assert_eq!(
		bounds.node(1).to_vec(),
		vec![Interval::new(NEG_INFINITY, 1.5), Interval::UNBOUNDED]
	);
	assert_eq!(
		bounds.node(3).to_vec(),
		vec![
			Interval::new(1.5, INFINITY),
			Interval::new(NEG_INFINITY, 2.5)
		]
	);
	assert_eq!(
		bounds.node(4).to_vec(),
		vec![Interval::new(1.5, INFINITY), Interval::new(2.5, INFINITY)]
	);
}

#[test]
fn test_compute_bounds_from_finite_root() {
	let tree = Tree::from_arrays(0, crate::stump_arrays(), 2).unwrap();
	let root = [Interval::new(0.0, 10.0), Interval::UNBOUNDED];
	let bounds = compute_bounds(&tree, &root);
	assert_eq!(bounds.node(0).to_vec(), root.to_vec());
	assert_eq!(bounds.node(1)[0], Interval::new(0.0, 1.5));
	assert_eq!(bounds.node(4)[0], Interval::new(1.5, 10.0));
}

#[test]
fn test_children_are_disjoint_subsets() {
	let tree = Tree::from_arrays(0, crate::stump_arrays(), 2).unwrap();
	let bounds = compute_bounds(&tree, &[Interval::UNBOUNDED; 2]);
	for (node_index, node) in tree.nodes.iter().enumerate() {
		if let Node::Branch(branch) = node {
			let parent = bounds.node(node_index);
			let left = bounds.node(branch.left_child_index);
			let right = bounds.node(branch.right_child_index);
			for feature_index in 0..2 {
				assert!(left[feature_index].is_subset_of(&parent[feature_index]));
				assert!(right[feature_index].is_subset_of(&parent[feature_index]));
			}
			assert!(left[branch.feature_index].max <= right[branch.feature_index].min);
		}
	}
}

#[test]
fn test_split_value_outside_of_the_box() {
	let tree = Tree::from_arrays(0, crate::stump_arrays(), 2).unwrap();
	let root = [Interval::new(2.0, 10.0), Interval::new(0.0, 2.0)];
	let bounds = compute_bounds(&tree, &root);
	// 1.5 is below the root's lower bound on feature 0, so the left child collapses onto it.
	assert_eq!(bounds.node(1)[0], Interval::new(2.0, 2.0));
	assert_eq!(bounds.node(2)[0], Interval::new(2.0, 10.0));
	// 2.5 is above node 2's upper bound on feature 1, so the right child collapses onto it.
	assert_eq!(bounds.node(3)[1], Interval::new(0.0, 2.0));
	assert_eq!(bounds.node(4)[1], Interval::new(2.0, 2.0));
	for node_index in 0..tree.n_nodes() {
		for interval in bounds.node(node_index).iter() {
			assert!(interval.min <= interval.max);
		}
	}
}
