/*!
This module defines [`EstimateOptions`](struct.EstimateOptions.html), which control how a circuit is estimated, and [`Config`](struct.Config.html), the form those options take in a YAML config file.
*/

use crate::error::{Error, Result};
use std::{fmt, path::Path, str::FromStr};

/// The file-level form of `EstimateOptions`. Every field is optional and falls back to the default.
///
/// ```yaml
/// sampling: oob
/// family: truncnorm
/// finite_bounds: local
/// alpha: 0.1
/// epsilon: 0.05
/// ```
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub sampling: Option<String>,
	pub family: Option<String>,
	pub finite_bounds: Option<String>,
	pub alpha: Option<f64>,
	pub epsilon: Option<f64>,
	pub parallel: Option<bool>,
}

impl Config {
	pub fn from_yaml_str(yaml: &str) -> Result<Self> {
		Ok(serde_yaml::from_str(yaml)?)
	}
}

pub fn load_config(config_path: &Path) -> Result<Config> {
	let config = std::fs::read_to_string(config_path).map_err(|source| Error::Io {
		path: config_path.to_owned(),
		source,
	})?;
	Config::from_yaml_str(&config)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimateOptions {
	/// Which rows count toward a tree's coverage and parameters.
	pub sampling: SamplingPolicy,
	/// The distribution family used for continuous variables.
	pub family: ContinuousFamily,
	/// How infinite sides of leaf bounding boxes are made finite.
	pub finite_bounds: FiniteBounds,
	/// The Laplace pseudocount added to every admissible level of a categorical variable. Must be >= 0.
	pub alpha: f64,
	/// The fraction of a range by which finite bounds are widened. Must be >= 0.
	pub epsilon: f64,
	/// If true, trees are processed on the rayon thread pool.
	pub parallel: bool,
}

impl Default for EstimateOptions {
	fn default() -> Self {
		Self {
			sampling: SamplingPolicy::All,
			family: ContinuousFamily::TruncatedNormal,
			finite_bounds: FiniteBounds::None,
			alpha: 0.0,
			epsilon: 0.0,
			parallel: true,
		}
	}
}

impl EstimateOptions {
	pub fn from_config(config: &Config) -> Result<Self> {
		let default = Self::default();
		let options = Self {
			sampling: config
				.sampling
				.as_deref()
				.map(str::parse)
				.transpose()?
				.unwrap_or(default.sampling),
			family: config
				.family
				.as_deref()
				.map(str::parse)
				.transpose()?
				.unwrap_or(default.family),
			finite_bounds: config
				.finite_bounds
				.as_deref()
				.map(str::parse)
				.transpose()?
				.unwrap_or(default.finite_bounds),
			alpha: config.alpha.unwrap_or(default.alpha),
			epsilon: config.epsilon.unwrap_or(default.epsilon),
			parallel: config.parallel.unwrap_or(default.parallel),
		};
		options.validate()?;
		Ok(options)
	}

	pub fn validate(&self) -> Result<()> {
		if !(self.alpha.is_finite() && self.alpha >= 0.0) {
			return Err(Error::Configuration(format!(
				"alpha must be a finite number >= 0, got {}",
				self.alpha
			)));
		}
		if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
			return Err(Error::Configuration(format!(
				"epsilon must be a finite number >= 0, got {}",
				self.epsilon
			)));
		}
		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum SamplingPolicy {
	#[serde(rename = "all")]
	All,
	/// Only rows that were not drawn into a tree's bootstrap sample count toward that tree.
	#[serde(rename = "oob")]
	OutOfBag,
	/// Only rows that were drawn into a tree's bootstrap sample count toward that tree.
	#[serde(rename = "inbag")]
	InBag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ContinuousFamily {
	#[serde(rename = "truncnorm")]
	TruncatedNormal,
	#[serde(rename = "unif")]
	Uniform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum FiniteBounds {
	#[serde(rename = "no")]
	None,
	/// Infinite sides are replaced per leaf by the range of values observed in that leaf.
	#[serde(rename = "local")]
	Local,
	/// Every tree's root box starts at the range of values observed in the whole dataset.
	#[serde(rename = "global")]
	Global,
}

impl FromStr for SamplingPolicy {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		match s {
			"all" => Ok(Self::All),
			"oob" | "out-of-bag" => Ok(Self::OutOfBag),
			"inbag" | "in-bag" => Ok(Self::InBag),
			_ => Err(Error::Configuration(format!(
				"unknown sampling policy \"{}\", expected one of \"all\", \"oob\", \"inbag\"",
				s
			))),
		}
	}
}

impl FromStr for ContinuousFamily {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		match s {
			"truncnorm" => Ok(Self::TruncatedNormal),
			"unif" => Ok(Self::Uniform),
			_ => Err(Error::Configuration(format!(
				"unknown continuous family \"{}\", expected one of \"truncnorm\", \"unif\"",
				s
			))),
		}
	}
}

impl FromStr for FiniteBounds {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		match s {
			"no" | "none" => Ok(Self::None),
			"local" => Ok(Self::Local),
			"global" => Ok(Self::Global),
			_ => Err(Error::Configuration(format!(
				"unknown finite bounds policy \"{}\", expected one of \"no\", \"local\", \"global\"",
				s
			))),
		}
	}
}

impl fmt::Display for SamplingPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::All => write!(f, "all"),
			Self::OutOfBag => write!(f, "oob"),
			Self::InBag => write!(f, "inbag"),
		}
	}
}

impl fmt::Display for ContinuousFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::TruncatedNormal => write!(f, "truncnorm"),
			Self::Uniform => write!(f, "unif"),
		}
	}
}

impl fmt::Display for FiniteBounds {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => write!(f, "no"),
			Self::Local => write!(f, "local"),
			Self::Global => write!(f, "global"),
		}
	}
}

#[test]
fn test_from_config() {
	let config = Config::from_yaml_str(
		"sampling: oob\nfamily: unif\nfinite_bounds: global\nalpha: 0.5\nparallel: false\n",
	)
	.unwrap();
	let options = EstimateOptions::from_config(&config).unwrap();
	assert_eq!(
		options,
		EstimateOptions {
			sampling: SamplingPolicy::OutOfBag,
			family: ContinuousFamily::Uniform,
			finite_bounds: FiniteBounds::Global,
			alpha: 0.5,
			epsilon: 0.0,
			parallel: false,
		}
	);
}

#[test]
fn test_unknown_family_is_a_configuration_error() {
	let config = Config::from_yaml_str("family: gamma\n").unwrap();
	let error = EstimateOptions::from_config(&config).unwrap_err();
	assert!(matches!(error, Error::Configuration(_)));
	assert_eq!(
		error.to_string(),
		"configuration error: unknown continuous family \"gamma\", expected one of \"truncnorm\", \"unif\""
	);
}

#[test]
fn test_negative_alpha_and_epsilon_are_rejected() {
	let options = EstimateOptions {
		alpha: -1.0,
		..Default::default()
	};
	assert!(matches!(options.validate(), Err(Error::Configuration(_))));
	let options = EstimateOptions {
		epsilon: -0.1,
		..Default::default()
	};
	assert!(matches!(options.validate(), Err(Error::Configuration(_))));
	assert!(EstimateOptions::default().validate().is_ok());
}

#[test]
fn test_unknown_config_keys_fail_to_parse() {
	assert!(matches!(
		Config::from_yaml_str("alhpa: 1.0\n"),
		Err(Error::Yaml(_))
	));
}

#[test]
fn test_load_config() {
	use std::io::Write;
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "sampling: inbag\nfinite_bounds: local\nepsilon: 0.2").unwrap();
	let config = load_config(file.path()).unwrap();
	let options = EstimateOptions::from_config(&config).unwrap();
	assert_eq!(options.sampling, SamplingPolicy::InBag);
	assert_eq!(options.finite_bounds, FiniteBounds::Local);
	assert_eq!(options.epsilon, 0.2);
	assert_eq!(options.family, ContinuousFamily::TruncatedNormal);
}

#[test]
fn test_load_config_from_a_missing_file() {
	let directory = tempfile::tempdir().unwrap();
	let path = directory.path().join("missing.yaml");
	match load_config(&path) {
		Err(Error::Io { path: error_path, .. }) => assert_eq!(error_path, path),
		result => panic!("expected an io error, got {:?}", result),
	}
}
