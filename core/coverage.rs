/*!
This module assigns the rows of the estimation dataset to the leaves of a tree, filters them according to the sampling policy, and computes the fraction of eligible rows that land in each leaf.
*/

use crate::{
	config::SamplingPolicy,
	error::{Error, Result},
};
use arf_dataframe::DataFrame;
use arf_tree::{Interval, Tree, TreeBounds};
use num_traits::ToPrimitive;
use std::collections::BTreeMap;

/// The coverage of a single leaf, before it is assigned a global index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeafCoverage {
	pub tree_index: usize,
	pub leaf_index: usize,
	pub coverage: f64,
	pub bounds: Vec<Interval>,
}

/// Route every row of `features` to its leaf in `tree`. A row that the sampling policy excludes from this tree is `None`.
pub(crate) fn assign_leaves(
	tree_index: usize,
	tree: &Tree,
	features: &DataFrame,
	sampling: SamplingPolicy,
) -> Result<Vec<Option<usize>>> {
	let n_rows = features.nrows();
	let inbag_counts = match sampling {
		SamplingPolicy::All => None,
		SamplingPolicy::OutOfBag | SamplingPolicy::InBag => {
			let inbag_counts = tree.inbag_counts.as_ref().ok_or_else(|| {
				Error::Configuration(format!(
					"sampling policy {} requires in-bag counts but tree {} has none",
					sampling, tree_index
				))
			})?;
			if inbag_counts.len() < n_rows {
				return Err(Error::Configuration(format!(
					"tree {} has in-bag counts for {} rows but the dataset has {} rows",
					tree_index,
					inbag_counts.len(),
					n_rows
				)));
			}
			// With honest splitting the dataset holds only the first half of the training rows, so only the first `n_rows` counts apply.
			Some(&inbag_counts[..n_rows])
		}
	};
	let leaves = (0..n_rows)
		.map(|row_index| {
			let keep = match (sampling, inbag_counts) {
				(SamplingPolicy::OutOfBag, Some(inbag_counts)) => inbag_counts[row_index] == 0,
				(SamplingPolicy::InBag, Some(inbag_counts)) => inbag_counts[row_index] > 0,
				_ => true,
			};
			if keep {
				Some(tree.terminal_node(features, row_index))
			} else {
				None
			}
		})
		.collect();
	Ok(leaves)
}

/// Compute the coverage of every leaf of a tree that received at least one eligible row. Leaves that received none are omitted, so the coverages that are returned always sum to one.
pub(crate) fn compute_coverage(
	tree_index: usize,
	bounds: &TreeBounds,
	leaves: &[Option<usize>],
) -> Vec<LeafCoverage> {
	let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
	for leaf_index in leaves.iter().flatten() {
		*counts.entry(*leaf_index).or_insert(0) += 1;
	}
	let n_eligible: u64 = counts.values().sum();
	if n_eligible == 0 {
		log::debug!("tree {} has no eligible rows and is dropped", tree_index);
		return Vec::new();
	}
	let n_eligible = n_eligible.to_f64().unwrap();
	counts
		.into_iter()
		.map(|(leaf_index, count)| LeafCoverage {
			tree_index,
			leaf_index,
			coverage: count.to_f64().unwrap() / n_eligible,
			bounds: bounds.node(leaf_index).to_vec(),
		})
		.collect()
}

#[cfg(test)]
fn test_tree(inbag_counts: Option<Vec<u32>>) -> (Tree, DataFrame) {
	use arf_dataframe::{Column, NumberColumn};
	use arf_tree::TreeArrays;
	// 0: x <= 2.5 ? 1 : 2
	let arrays = TreeArrays {
		split_feature_indexes: vec![0, 0, 0],
		split_values: vec![2.5, 0.0, 0.0],
		left_child_ids: vec![1, 0, 0],
		right_child_ids: vec![2, 0, 0],
		missing_values_directions: None,
		inbag_counts,
	};
	let tree = Tree::from_arrays(0, arrays, 1).unwrap();
	let features = DataFrame::new(vec![Column::Number(NumberColumn::new(
		"x".to_owned(),
		vec![1.0, 2.0, 3.0, 4.0],
	))])
	.unwrap();
	(tree, features)
}

#[test]
fn test_coverage_all_rows() {
	let (tree, features) = test_tree(None);
	let bounds = arf_tree::compute_bounds(&tree, &[Interval::UNBOUNDED]);
	let leaves = assign_leaves(0, &tree, &features, SamplingPolicy::All).unwrap();
	assert_eq!(leaves, vec![Some(1), Some(1), Some(2), Some(2)]);
	let coverage = compute_coverage(0, &bounds, &leaves);
	assert_eq!(coverage.len(), 2);
	assert_eq!(coverage[0].coverage, 0.5);
	assert_eq!(coverage[1].coverage, 0.5);
	assert_eq!(coverage[1].bounds, vec![Interval::new(2.5, std::f64::INFINITY)]);
}

#[test]
fn test_coverage_out_of_bag_and_in_bag() {
	let (tree, features) = test_tree(Some(vec![0, 2, 0, 0]));
	let bounds = arf_tree::compute_bounds(&tree, &[Interval::UNBOUNDED]);
	let oob = assign_leaves(0, &tree, &features, SamplingPolicy::OutOfBag).unwrap();
	assert_eq!(oob, vec![Some(1), None, Some(2), Some(2)]);
	let coverage = compute_coverage(0, &bounds, &oob);
	assert!((coverage[0].coverage - 1.0 / 3.0).abs() < 1e-12);
	assert!((coverage[1].coverage - 2.0 / 3.0).abs() < 1e-12);
	// Only leaf 1 receives an in-bag row, so leaf 2 is dropped.
	let inbag = assign_leaves(0, &tree, &features, SamplingPolicy::InBag).unwrap();
	let coverage = compute_coverage(0, &bounds, &inbag);
	assert_eq!(coverage.len(), 1);
	assert_eq!(coverage[0].leaf_index, 1);
	assert_eq!(coverage[0].coverage, 1.0);
}

#[test]
fn test_in_bag_requires_counts() {
	let (tree, features) = test_tree(None);
	assert!(matches!(
		assign_leaves(0, &tree, &features, SamplingPolicy::InBag),
		Err(Error::Configuration(_))
	));
	let (tree, features) = test_tree(Some(vec![1, 1]));
	assert!(matches!(
		assign_leaves(0, &tree, &features, SamplingPolicy::OutOfBag),
		Err(Error::Configuration(_))
	));
}
