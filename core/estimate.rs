/*!
This module defines [`estimate`](fn.estimate.html), which converts a trained forest and the dataset it is evaluated on into a [`Circuit`](../circuit/struct.Circuit.html).
*/

use crate::{
	categorical,
	circuit::{self, Circuit, Family, VariableClass, VariableMetadata},
	config::{ContinuousFamily, EstimateOptions, FiniteBounds, SamplingPolicy},
	continuous::{self, ContinuousOptions},
	coverage::{assign_leaves, compute_coverage},
	error::{Error, Result},
	index::index_leaves,
};
use arf_dataframe::{Column, DataFrame};
use arf_metrics::{MinMax, StreamingMetric};
use arf_tree::{compute_bounds, Forest, Interval};
use arf_util::finite::{Finite, ToFinite};
use rayon::prelude::*;

/**
Estimate a probabilistic circuit from `forest` and `features`.

Each tree is processed independently: its leaves' bounding boxes are reconstructed, the eligible rows are routed to its leaves, and each leaf's coverage and per-variable parameters are estimated from the rows that land in it. Per-tree results are concatenated and sorted, so the output does not depend on `options.parallel`.

# Errors

Returns `Error::Configuration` if `options` are invalid, if out-of-bag sampling is requested for a dataset that is neither the training data nor its first half, or if the sampling policy needs in-bag counts that a tree lacks. Returns `Error::Data` if the dataset does not have one column per forest feature, has no rows, contains an infinite value, has a number column whose values are all missing, since such a column has no range to bound its leaves with, or has an enum column with no options.
*/
pub fn estimate(forest: &Forest, features: &DataFrame, options: &EstimateOptions) -> Result<Circuit> {
	options.validate()?;
	let finite_bounds = resolve_finite_bounds(options);
	validate_features(forest, features)?;
	check_sampling(forest, features, options.sampling)?;

	let continuous_columns: Vec<usize> = features
		.columns
		.iter()
		.enumerate()
		.filter(|(_, column)| matches!(column, Column::Number(_)))
		.map(|(index, _)| index)
		.collect();
	let categorical_columns: Vec<usize> = features
		.columns
		.iter()
		.enumerate()
		.filter(|(_, column)| matches!(column, Column::Enum(_)))
		.map(|(index, _)| index)
		.collect();
	let global_ranges = compute_global_ranges(features);
	let root = root_bounds(&global_ranges, finite_bounds, options.epsilon);
	log::info!(
		"estimating circuit from {} trees and {} rows with sampling policy {}, family {}, finite bounds {}",
		forest.n_trees(),
		features.nrows(),
		options.sampling,
		options.family,
		finite_bounds,
	);

	// Reconstruct the bounding boxes and compute the coverage of every tree's leaves.
	let coverage = map_trees(forest, options.parallel, |tree_index| {
		let tree = &forest.trees[tree_index];
		let bounds = compute_bounds(tree, &root);
		let assignments = assign_leaves(tree_index, tree, features, options.sampling)?;
		Ok(compute_coverage(tree_index, &bounds, &assignments))
	})?;
	let (leaves, index) = index_leaves(forest.n_trees(), coverage.into_iter().flatten().collect());

	// Estimate the parameters of every leaf.
	let partials = map_trees(forest, options.parallel, |tree_index| {
		let tree = &forest.trees[tree_index];
		let assignments = assign_leaves(tree_index, tree, features, options.sampling)?;
		let continuous = continuous::summarize_tree(
			tree_index,
			&assignments,
			&index,
			&leaves,
			features,
			&continuous_columns,
		);
		let categorical = categorical::estimate_tree(
			tree_index,
			&assignments,
			&index,
			&leaves,
			features,
			&categorical_columns,
			options.alpha,
		);
		Ok((continuous, categorical))
	})?;
	let mut summaries = Vec::new();
	let mut categorical = Vec::new();
	for (tree_summaries, tree_categorical) in partials {
		summaries.extend(tree_summaries);
		categorical.extend(tree_categorical);
	}
	let continuous = continuous::estimate_continuous(
		summaries,
		&global_ranges,
		ContinuousOptions {
			family: options.family,
			finite_bounds,
			epsilon: options.epsilon,
		},
	);

	let metadata = compute_metadata(features, options.family);
	let schema = features
		.columns
		.iter()
		.map(|column| column.name().to_owned())
		.zip(features.column_types())
		.collect();
	let circuit = circuit::assemble(continuous, categorical, leaves, metadata, schema);
	log::info!(
		"estimated circuit with {} leaves, {} continuous rows, and {} categorical rows",
		circuit.n_leaves(),
		circuit.continuous.len(),
		circuit.categorical.len(),
	);
	Ok(circuit)
}

/// Run `f` on every tree index, on the rayon thread pool if `parallel` is true, and collect the results in tree order.
fn map_trees<T, F>(forest: &Forest, parallel: bool, f: F) -> Result<Vec<T>>
where
	T: Send,
	F: Fn(usize) -> Result<T> + Send + Sync,
{
	if parallel {
		(0..forest.n_trees()).into_par_iter().map(f).collect()
	} else {
		(0..forest.n_trees()).map(f).collect()
	}
}

/// Uniform densities need finite support, so the uniform family always uses at least local finite bounds.
fn resolve_finite_bounds(options: &EstimateOptions) -> FiniteBounds {
	if options.family == ContinuousFamily::Uniform && options.finite_bounds == FiniteBounds::None {
		log::warn!("the uniform family requires finite bounds, using local finite bounds");
		FiniteBounds::Local
	} else {
		options.finite_bounds
	}
}

fn validate_features(forest: &Forest, features: &DataFrame) -> Result<()> {
	if features.ncols() != forest.n_features {
		return Err(Error::Data(format!(
			"the dataset has {} columns but the forest splits on {} features",
			features.ncols(),
			forest.n_features
		)));
	}
	if features.nrows() == 0 {
		return Err(Error::Data("the dataset has no rows".to_owned()));
	}
	for column in features.columns.iter() {
		match column {
			Column::Number(column) => {
				for (row_index, value) in column.data.iter().enumerate() {
					// NaN marks a missing value. Any other non-finite value is an error.
					if !value.is_nan() {
						value.to_finite().map_err(|error| {
							Error::Data(format!(
								"column {} row {}: {}",
								column.name, row_index, error
							))
						})?;
					}
				}
				if column.data.iter().all(|value| value.is_nan()) {
					return Err(Error::Data(format!(
						"column {} has no observed values",
						column.name
					)));
				}
			}
			Column::Enum(column) => {
				if column.options.is_empty() {
					return Err(Error::Data(format!(
						"column {} has no options",
						column.name
					)));
				}
			}
		}
	}
	Ok(())
}

/// Out-of-bag coverage is only meaningful on the rows the forest was trained on. With honest splitting, the dataset holds half of them.
fn check_sampling(forest: &Forest, features: &DataFrame, sampling: SamplingPolicy) -> Result<()> {
	let n_rows = features.nrows();
	if sampling == SamplingPolicy::OutOfBag
		&& n_rows != forest.num_samples
		&& n_rows * 2 != forest.num_samples
	{
		return Err(Error::Configuration(format!(
			"out-of-bag sampling requires the training data, but the dataset has {} rows and the forest was trained on {}",
			n_rows, forest.num_samples
		)));
	}
	Ok(())
}

/// The smallest and largest observed value of every number column. Enum columns have none.
fn compute_global_ranges(features: &DataFrame) -> Vec<Option<(f64, f64)>> {
	features
		.columns
		.iter()
		.map(|column| match column {
			Column::Number(column) => {
				let mut range = MinMax::new();
				column.data.iter().for_each(|value| range.update(*value));
				range.finalize()
			}
			Column::Enum(_) => None,
		})
		.collect()
}

/// The bounding box of every tree's root. With global finite bounds, number columns start at their observed range widened by `epsilon / 2` of its width on each side.
fn root_bounds(
	global_ranges: &[Option<(f64, f64)>],
	finite_bounds: FiniteBounds,
	epsilon: f64,
) -> Vec<Interval> {
	global_ranges
		.iter()
		.map(|global_range| match (finite_bounds, global_range) {
			(FiniteBounds::Global, Some((min, max))) => {
				let padding = (max - min) * epsilon / 2.0;
				Interval::new(min - padding, max + padding)
			}
			_ => Interval::UNBOUNDED,
		})
		.collect()
}

fn compute_metadata(features: &DataFrame, family: ContinuousFamily) -> Vec<VariableMetadata> {
	features
		.columns
		.iter()
		.map(|column| match column {
			Column::Number(column) => VariableMetadata {
				name: column.name.clone(),
				class: VariableClass::Numeric,
				family: family.into(),
				decimals: column
					.data
					.iter()
					.filter_map(|value| value.to_finite().ok())
					.map(count_decimals)
					.max(),
			},
			Column::Enum(column) => VariableMetadata {
				name: column.name.clone(),
				class: VariableClass::Factor,
				family: Family::Multinomial,
				decimals: None,
			},
		})
		.collect()
}

/// The number of digits after the decimal point in the shortest decimal representation of `value` that round trips.
fn count_decimals(value: Finite) -> usize {
	let value = value.get().to_string();
	value
		.find('.')
		.map(|position| value.len() - position - 1)
		.unwrap_or(0)
}

#[test]
fn test_count_decimals() {
	assert_eq!(count_decimals(Finite::new(5.0).unwrap()), 0);
	assert_eq!(count_decimals(Finite::new(-12.25).unwrap()), 2);
	assert_eq!(count_decimals(Finite::new(0.1).unwrap()), 1);
	assert_eq!(count_decimals(Finite::new(1e-7).unwrap()), 7);
}

#[test]
fn test_root_bounds() {
	let ranges = vec![Some((0.0, 10.0)), None];
	assert_eq!(
		root_bounds(&ranges, FiniteBounds::Global, 0.2),
		vec![Interval::new(-1.0, 11.0), Interval::UNBOUNDED]
	);
	assert_eq!(
		root_bounds(&ranges, FiniteBounds::Local, 0.2),
		vec![Interval::UNBOUNDED, Interval::UNBOUNDED]
	);
}

#[test]
fn test_uniform_escalates_to_local_bounds() {
	let options = EstimateOptions {
		family: ContinuousFamily::Uniform,
		..Default::default()
	};
	assert_eq!(resolve_finite_bounds(&options), FiniteBounds::Local);
	let options = EstimateOptions {
		family: ContinuousFamily::Uniform,
		finite_bounds: FiniteBounds::Global,
		..Default::default()
	};
	assert_eq!(resolve_finite_bounds(&options), FiniteBounds::Global);
}

#[test]
fn test_honest_out_of_bag_requires_exactly_half() {
	use arf_dataframe::NumberColumn;
	let features = |n_rows: usize| {
		DataFrame::new(vec![Column::Number(NumberColumn::new(
			"x".to_owned(),
			vec![1.0; n_rows],
		))])
		.unwrap()
	};
	let forest = Forest::new(Vec::new(), 1, 9);
	assert!(check_sampling(&forest, &features(9), SamplingPolicy::OutOfBag).is_ok());
	assert!(matches!(
		check_sampling(&forest, &features(4), SamplingPolicy::OutOfBag),
		Err(Error::Configuration(_))
	));
	let forest = Forest::new(Vec::new(), 1, 8);
	assert!(check_sampling(&forest, &features(4), SamplingPolicy::OutOfBag).is_ok());
	assert!(check_sampling(&forest, &features(5), SamplingPolicy::All).is_ok());
}
