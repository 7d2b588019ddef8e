use thiserror::Error;

/// A `Finite` is an `f64` that is guaranteed to be neither infinite nor NaN.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Finite(f64);

#[derive(Debug, Error, PartialEq)]
#[error("{0} is not finite")]
pub struct NotFiniteError(pub f64);

impl Finite {
	pub fn new(value: f64) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError(value))
		}
	}

	pub fn get(self) -> f64 {
		self.0
	}
}

pub trait ToFinite {
	/// If the value is finite, return `Ok(Finite(self))`, otherwise return the offending value in the error.
	fn to_finite(self) -> Result<Finite, NotFiniteError>;
}

impl ToFinite for f64 {
	fn to_finite(self) -> Result<Finite, NotFiniteError> {
		Finite::new(self)
	}
}

#[test]
fn test_rejects_non_finite_values() {
	assert_eq!(
		std::f64::INFINITY.to_finite().unwrap_err(),
		NotFiniteError(std::f64::INFINITY)
	);
	assert!(std::f64::NAN.to_finite().is_err());
	assert_eq!(1.5.to_finite().unwrap().get(), 1.5);
	assert_eq!(
		NotFiniteError(std::f64::NEG_INFINITY).to_string(),
		"-inf is not finite"
	);
}
