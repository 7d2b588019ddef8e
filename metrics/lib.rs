/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the aggregations used to summarize the rows that land in a leaf: [`MeanVariance`](struct.MeanVariance.html), [`MinMax`](struct.MinMax.html), and [`LevelCounts`](struct.LevelCounts.html).
*/

#![allow(clippy::tabs_in_doc_comments)]

mod level_counts;
mod mean_variance;
mod min_max;

pub use self::level_counts::{LevelCounts, LevelCountsOutput};
pub use self::mean_variance::{merge_mean_m2, MeanVariance, MeanVarianceOutput};
pub use self::min_max::MinMax;

/**
The `StreamingMetric` trait defines a common interface to aggregations that are computed in a streaming manner, where the input arrives one value at a time.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. This is useful when the rows of a group are split across threads. When finished aggregating, call `finalize()` to produce the associated type `Output`.

# Examples

```
use arf_metrics::StreamingMetric;

struct Min(f64);

impl StreamingMetric<'_> for Min {
	type Input = f64;
	type Output = f64;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.min(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.min(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```

The seemingly unused generic lifetime `'a` exists here to allow `Input`s and `Output`s to borrow from their enclosing scope.
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
