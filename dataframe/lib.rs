/*!
This crate provides the minimal dataframe needed to estimate a probabilistic circuit: a two dimensional table where every column is either a `Number` column holding continuous values or an `Enum` column holding levels drawn from a fixed, ordered set of options.

Missing values are represented as `NaN` in number columns and `None` in enum columns. Enum values are stored as 1-based ordinals into `options`, which is also how decision trees split on them.
*/

#![allow(clippy::tabs_in_doc_comments)]

use num_traits::ToPrimitive;
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Number(NumberColumn),
	Enum(EnumColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

/// The declared type of a column. The type is fixed when the column is created and every downstream computation dispatches on it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type")]
pub enum ColumnType {
	#[serde(rename = "number")]
	Number,
	#[serde(rename = "enum")]
	Enum { options: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
	Number(f64),
	Enum(Option<NonZeroUsize>),
}

#[derive(Debug, Error, PartialEq)]
pub enum DataFrameError {
	#[error("column {name} has {len} rows but the first column has {expected}")]
	LengthMismatch {
		name: String,
		len: usize,
		expected: usize,
	},
	#[error("column {name} contains level {level} but only has {n_options} options")]
	LevelOutOfRange {
		name: String,
		level: usize,
		n_options: usize,
	},
}

impl DataFrame {
	/// Create a dataframe from `columns`, checking that every column has the same number of rows and that every enum value refers to one of its column's options.
	pub fn new(columns: Vec<Column>) -> Result<Self, DataFrameError> {
		let expected = columns.first().map(|column| column.len()).unwrap_or(0);
		for column in columns.iter() {
			if column.len() != expected {
				return Err(DataFrameError::LengthMismatch {
					name: column.name().to_owned(),
					len: column.len(),
					expected,
				});
			}
			if let Column::Enum(column) = column {
				let n_options = column.options.len();
				if let Some(level) = column
					.data
					.iter()
					.flatten()
					.map(|level| level.get())
					.find(|level| *level > n_options)
				{
					return Err(DataFrameError::LevelOutOfRange {
						name: column.name.clone(),
						level,
						n_options,
					});
				}
			}
		}
		Ok(Self { columns })
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn column_types(&self) -> Vec<ColumnType> {
		self.columns.iter().map(|column| column.column_type()).collect()
	}
}

impl Column {
	pub fn len(&self) -> usize {
		match self {
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Number(s) => s.name.as_str(),
			Self::Enum(s) => s.name.as_str(),
		}
	}

	pub fn column_type(&self) -> ColumnType {
		match self {
			Self::Number(_) => ColumnType::Number,
			Self::Enum(s) => ColumnType::Enum {
				options: s.options.clone(),
			},
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Self::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn value(&self, index: usize) -> Value {
		match self {
			Self::Number(s) => Value::Number(s.data[index]),
			Self::Enum(s) => Value::Enum(s.data[index]),
		}
	}
}

impl NumberColumn {
	pub fn new(name: String, data: Vec<f64>) -> Self {
		Self { name, data }
	}
}

impl EnumColumn {
	pub fn new(name: String, options: Vec<String>, data: Vec<Option<NonZeroUsize>>) -> Self {
		Self {
			name,
			options,
			data,
		}
	}

	/// Create an enum column from string values. Values that are `None` or that do not match one of `options` are missing.
	pub fn from_strs(name: String, options: Vec<String>, values: &[Option<&str>]) -> Self {
		let data = values
			.iter()
			.map(|value| {
				value.and_then(|value| {
					options
						.iter()
						.position(|option| option == value)
						.and_then(|position| NonZeroUsize::new(position + 1))
				})
			})
			.collect();
		Self {
			name,
			options,
			data,
		}
	}
}

impl Value {
	/// This is the value a tree split threshold is compared against. Enum values are compared by their ordinal. Missing values return `None`.
	pub fn as_split_value(&self) -> Option<f64> {
		match self {
			Self::Number(value) if value.is_nan() => None,
			Self::Number(value) => Some(*value),
			Self::Enum(level) => level.and_then(|level| level.get().to_f64()),
		}
	}
}

#[test]
fn test_enum_from_strs() {
	let column = EnumColumn::from_strs(
		"color".to_owned(),
		vec!["red".to_owned(), "green".to_owned()],
		&[Some("green"), None, Some("blue"), Some("red")],
	);
	let levels: Vec<Option<usize>> = column
		.data
		.iter()
		.map(|level| level.map(|level| level.get()))
		.collect();
	assert_eq!(levels, vec![Some(2), None, None, Some(1)]);
}

#[test]
fn test_new_rejects_ragged_columns() {
	let result = DataFrame::new(vec![
		Column::Number(NumberColumn::new("a".to_owned(), vec![1.0, 2.0])),
		Column::Number(NumberColumn::new("b".to_owned(), vec![1.0])),
	]);
	insta::assert_debug_snapshot!(result, @r###"
 Err(
     LengthMismatch {
         name: "b",
         len: 1,
         expected: 2,
     },
 )
 "###);
}

#[test]
fn test_new_rejects_unknown_levels() {
	let result = DataFrame::new(vec![Column::Enum(EnumColumn::new(
		"a".to_owned(),
		vec!["x".to_owned()],
		vec![NonZeroUsize::new(2)],
	))]);
	assert_eq!(
		result.unwrap_err().to_string(),
		"column a contains level 2 but only has 1 options"
	);
}

#[test]
fn test_split_values() {
	assert_eq!(Value::Number(std::f64::NAN).as_split_value(), None);
	assert_eq!(Value::Number(2.5).as_split_value(), Some(2.5));
	assert_eq!(Value::Enum(NonZeroUsize::new(3)).as_split_value(), Some(3.0));
	assert_eq!(Value::Enum(None).as_split_value(), None);
}
