/*!
This crate represents a trained random forest as an arena of nodes per tree, routes rows of a dataframe to their terminal leaves, and reconstructs the axis-aligned region of variable space that each node of a tree covers.

Trees arrive from a forest trainer as parallel arrays indexed by node id. Node 0 is the root, a child id of 0 means "no child", and every child id is greater than its parent's id, so iterating nodes in index order visits parents before children.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod bounds;

pub use self::bounds::{compute_bounds, Interval, TreeBounds};

use arf_dataframe::DataFrame;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
	#[error("tree {tree} has no nodes")]
	EmptyTree { tree: usize },
	#[error("tree {tree} has mismatched array lengths: {details}")]
	LengthMismatch { tree: usize, details: String },
	#[error("tree {tree} node {node} has child {child}, which is not a valid child id")]
	InvalidChild {
		tree: usize,
		node: usize,
		child: usize,
	},
	#[error("tree {tree} node {node} has exactly one child")]
	SingleChild { tree: usize, node: usize },
	#[error("tree {tree} node {node} splits on feature {feature} but the forest has {n_features} features")]
	InvalidFeature {
		tree: usize,
		node: usize,
		feature: usize,
		n_features: usize,
	},
	#[error("tree {tree} node {node} has a split value that is not a number")]
	InvalidSplitValue { tree: usize, node: usize },
}

/// The per-tree arrays exported by a forest trainer. All node arrays are indexed by node id and must have the same length.
#[derive(Debug, Clone, Default)]
pub struct TreeArrays {
	pub split_feature_indexes: Vec<usize>,
	pub split_values: Vec<f64>,
	pub left_child_ids: Vec<usize>,
	pub right_child_ids: Vec<usize>,
	/// This is the direction rows with a missing split value are sent. If it is `None`, they are sent left.
	pub missing_values_directions: Option<Vec<SplitDirection>>,
	/// The number of times each training row was drawn into this tree's bootstrap sample.
	pub inbag_counts: Option<Vec<u32>>,
}

/// A `Forest` is an ordered collection of trees that all split on the same set of features.
#[derive(Debug, Clone)]
pub struct Forest {
	pub trees: Vec<Tree>,
	pub n_features: usize,
	/// The number of rows the forest was trained on.
	pub num_samples: usize,
}

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children.
#[derive(Debug, Clone)]
pub struct Tree {
	pub nodes: Vec<Node>,
	pub inbag_counts: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Branch(BranchNode),
	/// A node whose two child slots point at the same node. This happens when the trainer prunes one side of a split. Rows pass straight through and the split constrains nothing.
	PassThrough(PassThroughNode),
	Leaf,
}

/// A branch sends a row to its left child if the value of `feature_index` is <= `split_value` and to its right child otherwise. Enum features are compared by their 1-based level ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
	pub feature_index: usize,
	pub split_value: f64,
	pub left_child_index: usize,
	pub right_child_index: usize,
	pub missing_values_direction: SplitDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassThroughNode {
	pub child_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitDirection {
	Left,
	Right,
}

impl Forest {
	pub fn new(trees: Vec<Tree>, n_features: usize, num_samples: usize) -> Self {
		Self {
			trees,
			n_features,
			num_samples,
		}
	}

	/// Build a forest from the arrays exported by a trainer, validating every tree.
	pub fn from_arrays(
		arrays: Vec<TreeArrays>,
		n_features: usize,
		num_samples: usize,
	) -> Result<Self, ForestError> {
		let trees = arrays
			.into_iter()
			.enumerate()
			.map(|(tree_index, arrays)| Tree::from_arrays(tree_index, arrays, n_features))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self::new(trees, n_features, num_samples))
	}

	pub fn n_trees(&self) -> usize {
		self.trees.len()
	}
}

impl Tree {
	/// Build a tree from parallel node arrays. `tree_index` is only used to produce helpful errors.
	pub fn from_arrays(
		tree_index: usize,
		arrays: TreeArrays,
		n_features: usize,
	) -> Result<Self, ForestError> {
		let TreeArrays {
			split_feature_indexes,
			split_values,
			left_child_ids,
			right_child_ids,
			missing_values_directions,
			inbag_counts,
		} = arrays;
		let n_nodes = left_child_ids.len();
		if n_nodes == 0 {
			return Err(ForestError::EmptyTree { tree: tree_index });
		}
		let mismatched = split_feature_indexes.len() != n_nodes
			|| split_values.len() != n_nodes
			|| right_child_ids.len() != n_nodes
			|| missing_values_directions
				.as_ref()
				.map(|directions| directions.len() != n_nodes)
				.unwrap_or(false);
		if mismatched {
			return Err(ForestError::LengthMismatch {
				tree: tree_index,
				details: format!(
					"{} split features, {} split values, {} left children, {} right children, {} missing values directions",
					split_feature_indexes.len(),
					split_values.len(),
					n_nodes,
					right_child_ids.len(),
					missing_values_directions
						.as_ref()
						.map(|directions| directions.len().to_string())
						.unwrap_or_else(|| "no".to_owned()),
				),
			});
		}
		let mut nodes = Vec::with_capacity(n_nodes);
		for node_index in 0..n_nodes {
			let left = left_child_ids[node_index];
			let right = right_child_ids[node_index];
			let node = match (left, right) {
				(0, 0) => Node::Leaf,
				(0, _) | (_, 0) => {
					return Err(ForestError::SingleChild {
						tree: tree_index,
						node: node_index,
					})
				}
				_ => {
					for child in [left, right].iter().copied() {
						if child <= node_index || child >= n_nodes {
							return Err(ForestError::InvalidChild {
								tree: tree_index,
								node: node_index,
								child,
							});
						}
					}
					if left == right {
						Node::PassThrough(PassThroughNode { child_index: left })
					} else {
						let feature_index = split_feature_indexes[node_index];
						if feature_index >= n_features {
							return Err(ForestError::InvalidFeature {
								tree: tree_index,
								node: node_index,
								feature: feature_index,
								n_features,
							});
						}
						let split_value = split_values[node_index];
						if split_value.is_nan() {
							return Err(ForestError::InvalidSplitValue {
								tree: tree_index,
								node: node_index,
							});
						}
						let missing_values_direction = missing_values_directions
							.as_ref()
							.map(|directions| directions[node_index])
							.unwrap_or(SplitDirection::Left);
						Node::Branch(BranchNode {
							feature_index,
							split_value,
							left_child_index: left,
							right_child_index: right,
							missing_values_direction,
						})
					}
				}
			};
			nodes.push(node);
		}
		Ok(Self {
			nodes,
			inbag_counts,
		})
	}

	pub fn n_nodes(&self) -> usize {
		self.nodes.len()
	}

	/// The ids of this tree's leaves, in ascending order.
	pub fn leaf_indexes(&self) -> Vec<usize> {
		self.nodes
			.iter()
			.enumerate()
			.filter(|(_, node)| matches!(node, Node::Leaf))
			.map(|(node_index, _)| node_index)
			.collect()
	}

	/// Route row `row_index` of `features` from the root to the leaf it lands in and return that leaf's id.
	pub fn terminal_node(&self, features: &DataFrame, row_index: usize) -> usize {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					feature_index,
					split_value,
					left_child_index,
					right_child_index,
					missing_values_direction,
				}) => {
					let value = features.columns[*feature_index]
						.value(row_index)
						.as_split_value();
					let direction = match value {
						Some(value) if value <= *split_value => SplitDirection::Left,
						Some(_) => SplitDirection::Right,
						None => *missing_values_direction,
					};
					node_index = match direction {
						SplitDirection::Left => *left_child_index,
						SplitDirection::Right => *right_child_index,
					};
				}
				Node::PassThrough(PassThroughNode { child_index }) => {
					node_index = *child_index;
				}
				Node::Leaf => return node_index,
			}
		}
	}

	/// Route every row of `features` to its terminal leaf.
	pub fn terminal_nodes(&self, features: &DataFrame) -> Vec<usize> {
		(0..features.nrows())
			.map(|row_index| self.terminal_node(features, row_index))
			.collect()
	}
}

#[cfg(test)]
pub(crate) fn stump_arrays() -> TreeArrays {
	// 0: x0 <= 1.5 ? 1 : 2
	// 2: x1 <= 2.5 ? 3 : 4
	TreeArrays {
		split_feature_indexes: vec![0, 0, 1, 0, 0],
		split_values: vec![1.5, 0.0, 2.5, 0.0, 0.0],
		left_child_ids: vec![1, 0, 3, 0, 0],
		right_child_ids: vec![2, 0, 4, 0, 0],
		missing_values_directions: None,
		inbag_counts: None,
	}
}

#[test]
fn test_terminal_nodes() {
	use arf_dataframe::{Column, EnumColumn, NumberColumn};
	use std::num::NonZeroUsize;
	let tree = Tree::from_arrays(0, stump_arrays(), 2).unwrap();
	let features = DataFrame::new(vec![
		Column::Number(NumberColumn::new(
			"x0".to_owned(),
			vec![1.0, 2.0, 2.0, std::f64::NAN],
		)),
		Column::Enum(EnumColumn::new(
			"x1".to_owned(),
			vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
			vec![
				NonZeroUsize::new(3),
				NonZeroUsize::new(2),
				NonZeroUsize::new(3),
				NonZeroUsize::new(1),
			],
		)),
	])
	.unwrap();
	assert_eq!(tree.terminal_nodes(&features), vec![1, 3, 4, 1]);
	assert_eq!(tree.leaf_indexes(), vec![1, 3, 4]);
}

#[test]
fn test_pass_through_nodes() {
	let arrays = TreeArrays {
		split_feature_indexes: vec![0, 0, 0],
		split_values: vec![0.5, 0.0, 0.0],
		left_child_ids: vec![1, 2, 0],
		right_child_ids: vec![1, 2, 0],
		..Default::default()
	};
	let tree = Tree::from_arrays(0, arrays, 1).unwrap();
	assert_eq!(
		tree.nodes[0],
		Node::PassThrough(PassThroughNode { child_index: 1 })
	);
	assert_eq!(tree.leaf_indexes(), vec![2]);
}

#[test]
fn test_from_arrays_validation() {
	let mut arrays = stump_arrays();
	arrays.left_child_ids[2] = 1;
	insta::assert_debug_snapshot!(Tree::from_arrays(7, arrays, 2).unwrap_err(), @r###"
 InvalidChild {
     tree: 7,
     node: 2,
     child: 1,
 }
 "###);
	let mut arrays = stump_arrays();
	arrays.split_feature_indexes[2] = 5;
	assert_eq!(
		Tree::from_arrays(0, arrays, 2).unwrap_err().to_string(),
		"tree 0 node 2 splits on feature 5 but the forest has 2 features"
	);
	let mut arrays = stump_arrays();
	arrays.right_child_ids[0] = 0;
	assert_eq!(
		Tree::from_arrays(0, arrays, 2).unwrap_err(),
		ForestError::SingleChild { tree: 0, node: 0 }
	);
	let arrays = TreeArrays::default();
	assert_eq!(
		Tree::from_arrays(3, arrays, 2).unwrap_err(),
		ForestError::EmptyTree { tree: 3 }
	);
}

#[test]
fn test_missing_values_directions() {
	use arf_dataframe::{Column, NumberColumn};
	let mut arrays = stump_arrays();
	arrays.missing_values_directions = Some(vec![
		SplitDirection::Right,
		SplitDirection::Left,
		SplitDirection::Right,
		SplitDirection::Left,
		SplitDirection::Left,
	]);
	let tree = Tree::from_arrays(0, arrays, 2).unwrap();
	let features = DataFrame::new(vec![
		Column::Number(NumberColumn::new(
			"x0".to_owned(),
			vec![std::f64::NAN, std::f64::NAN, 1.0],
		)),
		Column::Number(NumberColumn::new(
			"x1".to_owned(),
			vec![1.0, std::f64::NAN, std::f64::NAN],
		)),
	])
	.unwrap();
	// A missing x0 goes right at the root, and a missing x1 goes right at node 2. Row 2 never reaches node 2.
	assert_eq!(tree.terminal_nodes(&features), vec![3, 4, 1]);
	// Without directions, missing values go left.
	let tree = Tree::from_arrays(0, stump_arrays(), 2).unwrap();
	assert_eq!(tree.terminal_nodes(&features), vec![1, 1, 1]);
}

#[test]
fn test_missing_values_directions_length() {
	let mut arrays = stump_arrays();
	arrays.missing_values_directions = Some(vec![SplitDirection::Right; 3]);
	assert_eq!(
		Tree::from_arrays(1, arrays, 2).unwrap_err(),
		ForestError::LengthMismatch {
			tree: 1,
			details: "5 split features, 5 split values, 5 left children, 5 right children, 3 missing values directions".to_owned(),
		}
	);
}
