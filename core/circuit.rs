/*!
This module defines the [`Circuit`](struct.Circuit.html) produced by estimation and the rows of each of its tables.
*/

use crate::config::ContinuousFamily;
use arf_dataframe::ColumnType;
use arf_tree::Interval;

/**
A `Circuit` is a weighted mixture of leaves. Each leaf's weight is its coverage, and within a leaf every variable is modeled independently by the parameters in `continuous` or `categorical`. Every table is joined on `f_idx`.
*/
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Circuit {
	/// One row per (f_idx, variable) for continuous variables, sorted by key.
	pub continuous: Vec<ContinuousParams>,
	/// One row per (f_idx, variable, level) for categorical variables, sorted by key.
	pub categorical: Vec<CategoricalParams>,
	/// One row per leaf, sorted by f_idx.
	pub leaves: Vec<Leaf>,
	/// One row per variable, in column order.
	pub metadata: Vec<VariableMetadata>,
	/// The names and types of the columns of the estimation dataset, in column order, so that generated data can be given the same shape.
	pub schema: Vec<(String, ColumnType)>,
}

/// A leaf of one tree, with its global index, its coverage, and its bounding box.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Leaf {
	pub f_idx: usize,
	pub tree: usize,
	pub leaf: usize,
	pub coverage: f64,
	/// One interval per variable. Sides may be infinite.
	pub bounds: Vec<Interval>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ContinuousParams {
	pub f_idx: usize,
	/// The column index of the variable.
	pub variable: usize,
	pub min: f64,
	pub max: f64,
	pub distribution: ContinuousDistribution,
	/// The fraction of rows in the leaf where this variable is missing.
	pub na_share: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "family")]
pub enum ContinuousDistribution {
	/// A normal distribution with mean `mu` and standard deviation `sigma`, truncated to `[min, max]`. `sigma` is always > 0.
	#[serde(rename = "truncnorm")]
	TruncatedNormal { mu: f64, sigma: f64 },
	/// A uniform distribution over `[min, max]`, which is always finite.
	#[serde(rename = "unif")]
	Uniform,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoricalParams {
	pub f_idx: usize,
	/// The column index of the variable.
	pub variable: usize,
	/// The 1-based ordinal of the level in the column's options.
	pub level: usize,
	pub prob: f64,
	/// The fraction of rows in the leaf where this variable is missing.
	pub na_share: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VariableMetadata {
	pub name: String,
	pub class: VariableClass,
	pub family: Family,
	/// The largest number of decimal digits observed in the column, used to round generated values. Categorical variables have none.
	pub decimals: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum VariableClass {
	#[serde(rename = "numeric")]
	Numeric,
	#[serde(rename = "factor")]
	Factor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Family {
	#[serde(rename = "truncnorm")]
	TruncatedNormal,
	#[serde(rename = "unif")]
	Uniform,
	#[serde(rename = "multinom")]
	Multinomial,
}

impl From<ContinuousFamily> for Family {
	fn from(family: ContinuousFamily) -> Self {
		match family {
			ContinuousFamily::TruncatedNormal => Family::TruncatedNormal,
			ContinuousFamily::Uniform => Family::Uniform,
		}
	}
}

impl ContinuousParams {
	pub fn interval(&self) -> Interval {
		Interval::new(self.min, self.max)
	}
}

/// Package the estimated tables into a `Circuit`, sorting each table by its key.
pub(crate) fn assemble(
	mut continuous: Vec<ContinuousParams>,
	mut categorical: Vec<CategoricalParams>,
	leaves: Vec<Leaf>,
	metadata: Vec<VariableMetadata>,
	schema: Vec<(String, ColumnType)>,
) -> Circuit {
	continuous.sort_by_key(|row| (row.f_idx, row.variable));
	categorical.sort_by_key(|row| (row.f_idx, row.variable, row.level));
	Circuit {
		continuous,
		categorical,
		leaves,
		metadata,
		schema,
	}
}

impl Circuit {
	pub fn n_leaves(&self) -> usize {
		self.leaves.len()
	}

	/// The categorical rows for one (f_idx, variable) pair.
	pub fn categorical_group(&self, f_idx: usize, variable: usize) -> &[CategoricalParams] {
		let start = self
			.categorical
			.partition_point(|row| (row.f_idx, row.variable) < (f_idx, variable));
		let end = self
			.categorical
			.partition_point(|row| (row.f_idx, row.variable) <= (f_idx, variable));
		&self.categorical[start..end]
	}

	/// The continuous row for one (f_idx, variable) pair.
	pub fn continuous_params(&self, f_idx: usize, variable: usize) -> Option<&ContinuousParams> {
		self.continuous
			.binary_search_by_key(&(f_idx, variable), |row| (row.f_idx, row.variable))
			.ok()
			.map(|index| &self.continuous[index])
	}
}
