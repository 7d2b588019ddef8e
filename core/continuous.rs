/*!
This module estimates the distribution of every continuous variable within every leaf.

Estimation happens in two passes. The first pass runs per tree and aggregates the values that land in each leaf. The second pass needs the aggregates of every leaf in the forest, because a leaf whose observed values are all equal borrows its width from the narrowest positive range observed in any other leaf.
*/

use crate::{
	circuit::{ContinuousDistribution, ContinuousParams, Leaf},
	config::{ContinuousFamily, FiniteBounds},
	index::LeafIndex,
};
use arf_dataframe::DataFrame;
use arf_metrics::{MeanVariance, MeanVarianceOutput, MinMax, StreamingMetric};
use arf_tree::Interval;
use fnv::FnvHashMap;
use itertools::izip;
use num_traits::ToPrimitive;

/// The 97.5th percentile of the standard normal distribution. A prior with standard deviation `half_width / Z_975` places 95% of its mass within `half_width` of its mean.
const Z_975: f64 = 1.959_963_984_540_054;

/// The smallest width used to widen a degenerate interval when `epsilon` is smaller.
const MIN_PSEUDO_RANGE: f64 = 1e-6;

/// The aggregate of one continuous variable's values within one leaf.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContinuousAggregate {
	moments: MeanVariance,
	range: MinMax,
	n_missing: u64,
}

impl StreamingMetric<'_> for ContinuousAggregate {
	type Input = f64;
	type Output = (MeanVarianceOutput, Option<(f64, f64)>, u64);

	fn update(&mut self, value: f64) {
		if value.is_nan() {
			self.n_missing += 1;
		} else {
			self.moments.update(value);
			self.range.update(value);
		}
	}

	fn merge(&mut self, other: Self) {
		self.moments.merge(other.moments);
		self.range.merge(other.range);
		self.n_missing += other.n_missing;
	}

	fn finalize(self) -> Self::Output {
		(self.moments.finalize(), self.range.finalize(), self.n_missing)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContinuousSummary {
	pub f_idx: usize,
	pub variable: usize,
	pub bounds: Interval,
	pub moments: MeanVarianceOutput,
	/// The smallest and largest observed values, or `None` if every value is missing.
	pub observed: Option<(f64, f64)>,
	pub n_missing: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ContinuousOptions {
	pub family: ContinuousFamily,
	pub finite_bounds: FiniteBounds,
	pub epsilon: f64,
}

/// Aggregate the values of every continuous column for every leaf of one tree. `assignments` holds the leaf of each row, or `None` if the row is not eligible for this tree.
pub(crate) fn summarize_tree(
	tree_index: usize,
	assignments: &[Option<usize>],
	index: &LeafIndex,
	leaves: &[Leaf],
	features: &DataFrame,
	continuous_columns: &[usize],
) -> Vec<ContinuousSummary> {
	let mut summaries = Vec::with_capacity(index.n_leaves(tree_index) * continuous_columns.len());
	for variable in continuous_columns.iter().copied() {
		let column = match features.columns[variable].as_number() {
			Some(column) => column,
			None => continue,
		};
		let mut aggregates: FnvHashMap<usize, ContinuousAggregate> = FnvHashMap::default();
		for (leaf_index, value) in izip!(assignments.iter(), column.data.iter()) {
			if let Some(leaf_index) = leaf_index {
				aggregates.entry(*leaf_index).or_default().update(*value);
			}
		}
		for (leaf_index, aggregate) in aggregates {
			let f_idx = match index.f_idx(tree_index, leaf_index) {
				Some(f_idx) => f_idx,
				None => continue,
			};
			let (moments, observed, n_missing) = aggregate.finalize();
			summaries.push(ContinuousSummary {
				f_idx,
				variable,
				bounds: leaves[f_idx - 1].bounds[variable],
				moments,
				observed,
				n_missing,
			});
		}
	}
	summaries
}

/**
Turn the summaries of every leaf in the forest into distribution parameters.

`global_ranges` holds, per column, the smallest and largest value observed anywhere in the dataset. It is used to make a fully missing leaf's interval finite and to derive the prior for a leaf whose values have zero variance.
*/
pub(crate) fn estimate_continuous(
	summaries: Vec<ContinuousSummary>,
	global_ranges: &[Option<(f64, f64)>],
	options: ContinuousOptions,
) -> Vec<ContinuousParams> {
	let mut min_positive_ranges: FnvHashMap<usize, f64> = FnvHashMap::default();
	for summary in summaries.iter() {
		if let Some((min, max)) = summary.observed {
			let range = max - min;
			if range > 0.0 {
				let entry = min_positive_ranges
					.entry(summary.variable)
					.or_insert(range);
				*entry = entry.min(range);
			}
		}
	}
	summaries
		.into_iter()
		.map(|summary| {
			let global_range = global_ranges[summary.variable];
			let min_positive_range = min_positive_ranges.get(&summary.variable).copied();
			estimate_leaf_variable(summary, global_range, min_positive_range, options)
		})
		.collect()
}

fn estimate_leaf_variable(
	summary: ContinuousSummary,
	global_range: Option<(f64, f64)>,
	min_positive_range: Option<f64>,
	options: ContinuousOptions,
) -> ContinuousParams {
	let n_observed = summary.moments.n;
	let n_total = n_observed + summary.n_missing;
	let na_share = summary.n_missing.to_f64().unwrap() / n_total.max(1).to_f64().unwrap();
	let mut interval = summary.bounds;
	if options.finite_bounds == FiniteBounds::Local && !interval.is_finite() {
		if let Some(observed) = summary.observed {
			let local = local_bounds(observed, min_positive_range, options.epsilon);
			if interval.min.is_infinite() {
				interval.min = local.min;
			}
			if interval.max.is_infinite() {
				interval.max = local.max;
			}
		}
	}
	// A leaf with no observed values has nothing to estimate from, so its interval falls back to the global range.
	if n_observed == 0 {
		interval = finite_or_global(interval, global_range);
	}
	// Only rows missing the split value reach a leaf whose box has zero width. Center a pseudo range on its bound.
	if interval.min >= interval.max {
		let center = if interval.max.is_finite() {
			interval.max
		} else {
			interval.min
		};
		let pseudo_range = pseudo_range(min_positive_range, options.epsilon);
		interval = Interval::new(center - pseudo_range / 2.0, center + pseudo_range / 2.0);
	}
	let distribution = match options.family {
		ContinuousFamily::TruncatedNormal => {
			let mu = summary
				.moments
				.mean
				.unwrap_or_else(|| interval.midpoint());
			let sigma = match summary.moments.std() {
				Some(sigma) if sigma > 0.0 => sigma,
				_ => posterior_sigma(finite_or_global(interval, global_range), n_observed),
			};
			ContinuousDistribution::TruncatedNormal { mu, sigma }
		}
		ContinuousFamily::Uniform => ContinuousDistribution::Uniform,
	};
	ContinuousParams {
		f_idx: summary.f_idx,
		variable: summary.variable,
		min: interval.min,
		max: interval.max,
		distribution,
		na_share,
	}
}

/// The observed range of a leaf, widened on each side by `epsilon / 2` of its width. A leaf whose observed values are all equal is given a pseudo range centered on its value.
fn local_bounds(
	(min, max): (f64, f64),
	min_positive_range: Option<f64>,
	epsilon: f64,
) -> Interval {
	let range = max - min;
	if range > 0.0 {
		let padding = range * epsilon / 2.0;
		Interval::new(min - padding, max + padding)
	} else {
		let pseudo_range = pseudo_range(min_positive_range, epsilon);
		Interval::new(min - pseudo_range / 2.0, max + pseudo_range / 2.0)
	}
}

/// The width given to a degenerate interval: the narrowest positive range observed in any leaf, capped at `max(epsilon, MIN_PSEUDO_RANGE)`.
fn pseudo_range(min_positive_range: Option<f64>, epsilon: f64) -> f64 {
	let floor = epsilon.max(MIN_PSEUDO_RANGE);
	min_positive_range
		.map(|range| range.min(floor))
		.unwrap_or(floor)
}

fn finite_or_global(interval: Interval, global_range: Option<(f64, f64)>) -> Interval {
	let (global_min, global_max) = match global_range {
		Some(global_range) => global_range,
		None => return interval,
	};
	// A side taken from the global range never crosses the finite side of the interval.
	Interval::new(
		if interval.min.is_finite() {
			interval.min
		} else {
			global_min.min(interval.max)
		},
		if interval.max.is_finite() {
			interval.max
		} else {
			global_max.max(interval.min)
		},
	)
}

/**
The standard deviation of a leaf whose observed values have zero or undefined variance.

The prior standard deviation `sigma0` is chosen so that 95% of the prior's mass lies within the leaf's interval. Under a prior with two degrees of freedom and `n` identical observations, the posterior mode of the variance is `2 / n * sigma0^2`, which shrinks as observations accumulate but never reaches zero.
*/
fn posterior_sigma(interval: Interval, n_observed: u64) -> f64 {
	let sigma0 = (interval.max - interval.midpoint()) / Z_975;
	let sigma0 = if sigma0 > 0.0 && sigma0.is_finite() {
		sigma0
	} else {
		MIN_PSEUDO_RANGE / 2.0 / Z_975
	};
	let n = n_observed.max(1).to_f64().unwrap();
	(2.0 / n * sigma0 * sigma0).sqrt()
}

#[cfg(test)]
fn summary(values: &[f64], bounds: Interval) -> ContinuousSummary {
	let mut aggregate = ContinuousAggregate::default();
	values.iter().for_each(|value| aggregate.update(*value));
	let (moments, observed, n_missing) = aggregate.finalize();
	ContinuousSummary {
		f_idx: 1,
		variable: 0,
		bounds,
		moments,
		observed,
		n_missing,
	}
}

#[cfg(test)]
const TRUNCNORM_NO_BOUNDS: ContinuousOptions = ContinuousOptions {
	family: ContinuousFamily::TruncatedNormal,
	finite_bounds: FiniteBounds::None,
	epsilon: 0.0,
};

#[test]
fn test_mean_and_std() {
	let params = estimate_continuous(
		vec![summary(&[1.0, 2.0, 3.0, std::f64::NAN], Interval::UNBOUNDED)],
		&[Some((0.0, 10.0))],
		TRUNCNORM_NO_BOUNDS,
	);
	assert_eq!(params.len(), 1);
	let params = &params[0];
	assert_eq!(params.na_share, 0.25);
	assert_eq!(
		params.distribution,
		ContinuousDistribution::TruncatedNormal {
			mu: 2.0,
			sigma: 1.0
		}
	);
	assert_eq!(params.interval(), Interval::UNBOUNDED);
}

#[test]
fn test_zero_variance_uses_the_prior() {
	let bounds = Interval::new(0.0, 4.0);
	let sigma0 = 2.0 / Z_975;
	for n in 1..4 {
		let values = vec![1.0; n];
		let params = estimate_leaf_variable(summary(&values, bounds), Some((0.0, 4.0)), None, TRUNCNORM_NO_BOUNDS);
		match params.distribution {
			ContinuousDistribution::TruncatedNormal { mu, sigma } => {
				assert_eq!(mu, 1.0);
				let expected = (2.0 / n as f64 * sigma0 * sigma0).sqrt();
				assert!((sigma - expected).abs() < 1e-12);
			}
			_ => panic!("expected a truncated normal"),
		}
	}
}

#[test]
fn test_zero_variance_with_infinite_bounds_uses_the_global_range() {
	let params = estimate_leaf_variable(
		summary(&[3.0, 3.0], Interval::new(2.0, std::f64::INFINITY)),
		Some((0.0, 6.0)),
		None,
		TRUNCNORM_NO_BOUNDS,
	);
	// The prior is derived from [2, 6], but the interval itself stays unbounded above.
	assert_eq!(params.max, std::f64::INFINITY);
	match params.distribution {
		ContinuousDistribution::TruncatedNormal { sigma, .. } => {
			let sigma0 = 2.0 / Z_975;
			assert!((sigma - sigma0).abs() < 1e-12);
		}
		_ => panic!("expected a truncated normal"),
	}
}

#[test]
fn test_fully_missing_leaf() {
	let params = estimate_leaf_variable(
		summary(&[std::f64::NAN, std::f64::NAN], Interval::new(std::f64::NEG_INFINITY, 4.0)),
		Some((-2.0, 10.0)),
		None,
		TRUNCNORM_NO_BOUNDS,
	);
	assert_eq!(params.na_share, 1.0);
	assert_eq!(params.interval(), Interval::new(-2.0, 4.0));
	match params.distribution {
		ContinuousDistribution::TruncatedNormal { mu, sigma } => {
			assert_eq!(mu, 1.0);
			assert!(sigma > 0.0);
		}
		_ => panic!("expected a truncated normal"),
	}
}

#[test]
fn test_local_bounds() {
	let options = ContinuousOptions {
		family: ContinuousFamily::Uniform,
		finite_bounds: FiniteBounds::Local,
		epsilon: 0.5,
	};
	let params = estimate_leaf_variable(
		summary(&[2.0, 6.0], Interval::new(std::f64::NEG_INFINITY, 7.0)),
		Some((0.0, 10.0)),
		None,
		options,
	);
	// The range is 4, so the lower side is widened by 4 * 0.5 / 2.
	assert_eq!(params.interval(), Interval::new(1.0, 7.0));
	assert_eq!(params.distribution, ContinuousDistribution::Uniform);
}

#[test]
fn test_local_bounds_with_a_single_value() {
	let options = ContinuousOptions {
		family: ContinuousFamily::Uniform,
		finite_bounds: FiniteBounds::Local,
		epsilon: 0.1,
	};
	let summaries = vec![
		summary(&[5.0, 5.0], Interval::UNBOUNDED),
		ContinuousSummary {
			f_idx: 2,
			..summary(&[1.0, 1.05], Interval::UNBOUNDED)
		},
	];
	let params = estimate_continuous(summaries, &[Some((1.0, 5.0))], options);
	// The other leaf's range of 0.05 is narrower than epsilon, so it is used as the pseudo range.
	assert!((params[0].min - 4.975).abs() < 1e-12);
	assert!((params[0].max - 5.025).abs() < 1e-12);
	assert!(params[0].min < params[0].max);
}

#[test]
fn test_fully_missing_leaf_below_the_global_range() {
	// Only rows missing the split value reach a leaf bounded above by 2 when every observed value is above 2.
	let params = estimate_leaf_variable(
		summary(&[std::f64::NAN], Interval::new(std::f64::NEG_INFINITY, 2.0)),
		Some((3.0, 4.0)),
		None,
		TRUNCNORM_NO_BOUNDS,
	);
	assert!(params.min < params.max);
	assert!((params.interval().midpoint() - 2.0).abs() < 1e-12);
	match params.distribution {
		ContinuousDistribution::TruncatedNormal { mu, sigma } => {
			assert!(params.min <= mu && mu <= params.max);
			assert!(sigma > 0.0);
		}
		_ => panic!("expected a truncated normal"),
	}
	assert_eq!(
		finite_or_global(Interval::new(5.0, std::f64::INFINITY), Some((0.0, 4.0))),
		Interval::new(5.0, 5.0)
	);
}
