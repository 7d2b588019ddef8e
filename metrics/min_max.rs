use super::StreamingMetric;

/// `MinMax` tracks the smallest and largest values it has seen. `NaN` inputs are ignored.
#[derive(Debug, Clone, Default)]
pub struct MinMax(Option<(f64, f64)>);

impl MinMax {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for MinMax {
	type Input = f64;
	type Output = Option<(f64, f64)>;

	fn update(&mut self, value: f64) {
		if value.is_nan() {
			return;
		}
		self.0 = match self.0 {
			None => Some((value, value)),
			Some((min, max)) => Some((min.min(value), max.max(value))),
		}
	}

	fn merge(&mut self, other: Self) {
		if let Some((min, max)) = other.0 {
			self.update(min);
			self.update(max);
		}
	}

	fn finalize(self) -> Option<(f64, f64)> {
		self.0
	}
}

#[test]
fn test_min_max() {
	let mut a = MinMax::new();
	a.update(3.0);
	a.update(std::f64::NAN);
	a.update(-1.0);
	let mut b = MinMax::new();
	b.update(10.0);
	a.merge(b);
	assert_eq!(a.finalize(), Some((-1.0, 10.0)));
	assert_eq!(MinMax::new().finalize(), None);
}
