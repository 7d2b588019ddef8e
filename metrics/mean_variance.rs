//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm

use super::StreamingMetric;
use num_traits::ToPrimitive;

/// `MeanVariance` computes the mean and the sample variance of a stream of values.
#[derive(Debug, Clone, Default)]
pub struct MeanVariance {
	n: u64,
	mean: f64,
	m2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanVarianceOutput {
	pub n: u64,
	/// `None` if no values were aggregated.
	pub mean: Option<f64>,
	/// The unbiased sample variance. It is `None` if fewer than two values were aggregated.
	pub variance: Option<f64>,
}

impl MeanVarianceOutput {
	/// The sample standard deviation, or `None` if it is undefined.
	pub fn std(&self) -> Option<f64> {
		self.variance.map(f64::sqrt)
	}
}

impl MeanVariance {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for MeanVariance {
	type Input = f64;
	type Output = MeanVarianceOutput;

	fn update(&mut self, value: f64) {
		self.n += 1;
		let n = self.n.to_f64().unwrap();
		let delta = value - self.mean;
		self.mean += delta / n;
		self.m2 += delta * (value - self.mean);
	}

	fn merge(&mut self, other: Self) {
		if other.n == 0 {
			return;
		}
		if self.n == 0 {
			*self = other;
			return;
		}
		let (mean, m2) = merge_mean_m2(self.n, self.mean, self.m2, other.n, other.mean, other.m2);
		self.n += other.n;
		self.mean = mean;
		self.m2 = m2;
	}

	fn finalize(self) -> MeanVarianceOutput {
		let mean = if self.n > 0 { Some(self.mean) } else { None };
		let variance = if self.n > 1 {
			Some(self.m2 / (self.n - 1).to_f64().unwrap())
		} else {
			None
		};
		MeanVarianceOutput {
			n: self.n,
			mean,
			variance,
		}
	}
}

/// combine two separate means and m2s into a single mean and m2
pub fn merge_mean_m2(
	n_a: u64,
	mean_a: f64,
	m2_a: f64,
	n_b: u64,
	mean_b: f64,
	m2_b: f64,
) -> (f64, f64) {
	let n_a = n_a.to_f64().unwrap();
	let n_b = n_b.to_f64().unwrap();
	(
		(((n_a * mean_a) + (n_b * mean_b)) / (n_a + n_b)),
		m2_a + m2_b + (mean_b - mean_a) * (mean_b - mean_a) * (n_a * n_b / (n_a + n_b)),
	)
}

#[test]
fn test_mean_variance() {
	let mut metric = MeanVariance::new();
	for value in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
		metric.update(*value);
	}
	let output = metric.finalize();
	assert_eq!(output.n, 8);
	assert!((output.mean.unwrap() - 5.0).abs() < 1e-12);
	assert!((output.variance.unwrap() - 32.0 / 7.0).abs() < 1e-12);
}

#[test]
fn test_constant_values_have_zero_variance() {
	let mut metric = MeanVariance::new();
	for _ in 0..5 {
		metric.update(5.0);
	}
	let output = metric.finalize();
	assert_eq!(output.mean, Some(5.0));
	assert_eq!(output.variance, Some(0.0));
}

#[test]
fn test_merge_matches_sequential() {
	let values = [1.0, 3.5, -2.0, 8.25, 0.5, 4.0];
	let mut sequential = MeanVariance::new();
	values.iter().for_each(|value| sequential.update(*value));
	let mut a = MeanVariance::new();
	let mut b = MeanVariance::new();
	values[..2].iter().for_each(|value| a.update(*value));
	values[2..].iter().for_each(|value| b.update(*value));
	a.merge(b);
	let (a, sequential) = (a.finalize(), sequential.finalize());
	assert_eq!(a.n, sequential.n);
	assert!((a.mean.unwrap() - sequential.mean.unwrap()).abs() < 1e-12);
	assert!((a.variance.unwrap() - sequential.variance.unwrap()).abs() < 1e-12);
}

#[test]
fn test_single_value_has_no_variance() {
	let mut metric = MeanVariance::new();
	metric.update(3.0);
	insta::assert_debug_snapshot!(metric.finalize(), @r###"
 MeanVarianceOutput {
     n: 1,
     mean: Some(
         3.0,
     ),
     variance: None,
 }
 "###);
}
