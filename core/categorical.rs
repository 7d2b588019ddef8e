/*!
This module estimates a multinomial distribution over the levels of every categorical variable within every leaf.

Levels are identified by their 1-based ordinal in the column's options, and trees split on those ordinals, so the levels a leaf admits for a variable are exactly the ordinals `v` with `min < v <= max` in the leaf's interval for that variable.
*/

use crate::{circuit::CategoricalParams, circuit::Leaf, index::LeafIndex};
use arf_dataframe::DataFrame;
use arf_metrics::{LevelCounts, LevelCountsOutput, StreamingMetric};
use arf_tree::Interval;
use fnv::FnvHashMap;
use itertools::izip;
use num_traits::ToPrimitive;
use std::{collections::BTreeSet, ops::RangeInclusive};

/// Estimate the level probabilities of every categorical column for every leaf of one tree. `assignments` holds the leaf of each row, or `None` if the row is not eligible for this tree.
pub(crate) fn estimate_tree(
	tree_index: usize,
	assignments: &[Option<usize>],
	index: &LeafIndex,
	leaves: &[Leaf],
	features: &DataFrame,
	categorical_columns: &[usize],
	alpha: f64,
) -> Vec<CategoricalParams> {
	let mut params = Vec::new();
	for variable in categorical_columns.iter().copied() {
		let column = match features.columns[variable].as_enum() {
			Some(column) => column,
			None => continue,
		};
		let mut counts: FnvHashMap<usize, LevelCounts> = FnvHashMap::default();
		for (leaf_index, value) in izip!(assignments.iter(), column.data.iter()) {
			if let Some(leaf_index) = leaf_index {
				counts.entry(*leaf_index).or_default().update(*value);
			}
		}
		for (leaf_index, counts) in counts {
			let f_idx = match index.f_idx(tree_index, leaf_index) {
				Some(f_idx) => f_idx,
				None => continue,
			};
			let interval = leaves[f_idx - 1].bounds[variable];
			params.extend(estimate_group(
				f_idx,
				variable,
				interval,
				column.options.len(),
				counts.finalize(),
				alpha,
			));
		}
	}
	params
}

/// Estimate the level probabilities of one variable within one leaf.
fn estimate_group(
	f_idx: usize,
	variable: usize,
	interval: Interval,
	n_options: usize,
	counts: LevelCountsOutput,
	alpha: f64,
) -> Vec<CategoricalParams> {
	let LevelCountsOutput {
		n_missing,
		n_present,
		counts,
	} = counts;
	let na_share = n_missing.to_f64().unwrap() / (n_missing + n_present).max(1).to_f64().unwrap();
	let row = |level: usize, prob: f64| CategoricalParams {
		f_idx,
		variable,
		level,
		prob,
		na_share,
	};
	let admissible = admissible_levels(interval, n_options);
	if n_present == 0 {
		// Every value is missing, so spread the mass evenly over the admissible levels. If the interval admits no level at all, fall back to every level of the variable.
		let levels: Vec<usize> = if admissible.is_empty() {
			(1..=n_options).collect()
		} else {
			admissible.collect()
		};
		let prob = 1.0 / levels.len().max(1).to_f64().unwrap();
		return levels.into_iter().map(|level| row(level, prob)).collect();
	}
	let n_present = n_present.to_f64().unwrap();
	if alpha == 0.0 {
		return counts
			.into_iter()
			.map(|(level, count)| row(level, count.to_f64().unwrap() / n_present))
			.collect();
	}
	let levels: BTreeSet<usize> = admissible.chain(counts.keys().copied()).collect();
	let denominator = n_present + alpha * levels.len().to_f64().unwrap();
	levels
		.into_iter()
		.map(|level| {
			let count = counts.get(&level).copied().unwrap_or(0).to_f64().unwrap();
			row(level, (count + alpha) / denominator)
		})
		.collect()
}

/// The ordinals of the levels that fall within `interval`, which is open below and closed above. An infinite side admits every level on that side.
pub(crate) fn admissible_levels(interval: Interval, n_options: usize) -> RangeInclusive<usize> {
	let first = if interval.min < 1.0 {
		1
	} else {
		interval
			.min
			.floor()
			.to_usize()
			.map(|floor| floor.saturating_add(1))
			.unwrap_or(usize::MAX)
	};
	let last = if interval.max >= n_options.to_f64().unwrap() {
		n_options
	} else if interval.max < 1.0 {
		0
	} else {
		interval.max.floor().to_usize().unwrap_or(0)
	};
	first..=last
}

#[cfg(test)]
fn counts(levels: &[Option<usize>]) -> LevelCountsOutput {
	let mut counts = LevelCounts::new();
	for level in levels {
		counts.update(level.and_then(std::num::NonZeroUsize::new));
	}
	counts.finalize()
}

#[cfg(test)]
fn probs(params: &[CategoricalParams]) -> Vec<(usize, f64)> {
	params.iter().map(|row| (row.level, row.prob)).collect()
}

#[test]
fn test_admissible_levels() {
	assert_eq!(admissible_levels(Interval::UNBOUNDED, 4), 1..=4);
	assert_eq!(admissible_levels(Interval::new(1.5, 3.5), 4), 2..=3);
	assert_eq!(admissible_levels(Interval::new(2.0, 3.0), 4), 3..=3);
	assert_eq!(
		admissible_levels(Interval::new(std::f64::NEG_INFINITY, 2.5), 4),
		1..=2
	);
	assert_eq!(
		admissible_levels(Interval::new(3.5, std::f64::INFINITY), 4),
		4..=4
	);
	assert!(admissible_levels(Interval::new(std::f64::NEG_INFINITY, 0.5), 4).is_empty());
	assert!(admissible_levels(Interval::new(-3.0, -1.0), 4).is_empty());
}

#[test]
fn test_laplace_smoothing() {
	let params = estimate_group(1, 0, Interval::UNBOUNDED, 3, counts(&[Some(1), Some(1)]), 1.0);
	let probs = probs(&params);
	assert_eq!(probs.len(), 3);
	assert!((probs[0].1 - 0.6).abs() < 1e-12);
	assert!((probs[1].1 - 0.2).abs() < 1e-12);
	assert!((probs[2].1 - 0.2).abs() < 1e-12);
}

#[test]
fn test_smoothing_is_restricted_to_admissible_levels() {
	let params = estimate_group(
		1,
		0,
		Interval::new(1.5, std::f64::INFINITY),
		4,
		counts(&[Some(2), Some(3), Some(3), None]),
		0.5,
	);
	assert_eq!(
		params.iter().map(|row| row.level).collect::<Vec<_>>(),
		vec![2, 3, 4]
	);
	// (count + 0.5) / (3 + 0.5 * 3)
	let probs = probs(&params);
	assert!((probs[0].1 - 1.5 / 4.5).abs() < 1e-12);
	assert!((probs[1].1 - 2.5 / 4.5).abs() < 1e-12);
	assert!((probs[2].1 - 0.5 / 4.5).abs() < 1e-12);
	assert!(params.iter().all(|row| row.na_share == 0.25));
}

#[test]
fn test_without_smoothing_only_observed_levels_appear() {
	let params = estimate_group(
		1,
		0,
		Interval::UNBOUNDED,
		3,
		counts(&[Some(3), Some(1), Some(3), Some(3)]),
		0.0,
	);
	assert_eq!(probs(&params), vec![(1, 0.25), (3, 0.75)]);
}

#[test]
fn test_fully_missing_group_is_uniform_over_admissible_levels() {
	let params = estimate_group(
		7,
		2,
		Interval::new(std::f64::NEG_INFINITY, 2.5),
		3,
		counts(&[None, None]),
		0.0,
	);
	insta::assert_debug_snapshot!(params, @r###"
 [
     CategoricalParams {
         f_idx: 7,
         variable: 2,
         level: 1,
         prob: 0.5,
         na_share: 1.0,
     },
     CategoricalParams {
         f_idx: 7,
         variable: 2,
         level: 2,
         prob: 0.5,
         na_share: 1.0,
     },
 ]
 "###);
}
