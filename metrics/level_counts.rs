use super::StreamingMetric;
use std::{collections::BTreeMap, num::NonZeroUsize};

/// `LevelCounts` counts how many times each level of an enum column occurs, along with how many values are missing.
#[derive(Debug, Clone, Default)]
pub struct LevelCounts {
	n_missing: u64,
	counts: BTreeMap<usize, u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelCountsOutput {
	pub n_missing: u64,
	/// The number of non-missing values.
	pub n_present: u64,
	/// Counts keyed by 1-based level ordinal, in ascending order. Levels that never occurred are absent.
	pub counts: BTreeMap<usize, u64>,
}

impl LevelCounts {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for LevelCounts {
	type Input = Option<NonZeroUsize>;
	type Output = LevelCountsOutput;

	fn update(&mut self, value: Option<NonZeroUsize>) {
		match value {
			Some(level) => *self.counts.entry(level.get()).or_insert(0) += 1,
			None => self.n_missing += 1,
		}
	}

	fn merge(&mut self, other: Self) {
		self.n_missing += other.n_missing;
		for (level, count) in other.counts {
			*self.counts.entry(level).or_insert(0) += count;
		}
	}

	fn finalize(self) -> LevelCountsOutput {
		LevelCountsOutput {
			n_missing: self.n_missing,
			n_present: self.counts.values().sum(),
			counts: self.counts,
		}
	}
}

#[test]
fn test_level_counts() {
	let mut a = LevelCounts::new();
	a.update(NonZeroUsize::new(2));
	a.update(None);
	a.update(NonZeroUsize::new(2));
	let mut b = LevelCounts::new();
	b.update(NonZeroUsize::new(1));
	a.merge(b);
	insta::assert_debug_snapshot!(a.finalize(), @r###"
 LevelCountsOutput {
     n_missing: 1,
     n_present: 3,
     counts: {
         1: 1,
         2: 2,
     },
 }
 "###);
}
