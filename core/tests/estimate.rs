use arf_core::{
	estimate, CategoricalParams, Circuit, ContinuousDistribution, ContinuousFamily, Error,
	EstimateOptions, Family, FiniteBounds, SamplingPolicy, VariableClass,
};
use arf_dataframe::{Column, ColumnType, DataFrame, EnumColumn, NumberColumn};
use arf_tree::{Forest, TreeArrays};
use maplit::btreemap;
use std::{collections::BTreeMap, num::NonZeroUsize};

fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn leaf_only_tree(inbag_counts: Option<Vec<u32>>) -> TreeArrays {
	TreeArrays {
		split_feature_indexes: vec![0],
		split_values: vec![0.0],
		left_child_ids: vec![0],
		right_child_ids: vec![0],
		missing_values_directions: None,
		inbag_counts,
	}
}

const N_ROWS: usize = 40;

/// A dataset with two number columns and one enum column, all with some missing values.
fn features(n_rows: usize) -> DataFrame {
	let x = (0..n_rows)
		.map(|i| {
			if i % 13 == 0 {
				std::f64::NAN
			} else {
				(i % 10) as f64 + 0.5 * (i % 3) as f64
			}
		})
		.collect();
	let y = (0..n_rows).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
	let c = (0..n_rows)
		.map(|i| {
			if i % 9 == 0 {
				None
			} else {
				NonZeroUsize::new(1 + i % 4)
			}
		})
		.collect();
	DataFrame::new(vec![
		Column::Number(NumberColumn::new("x".to_owned(), x)),
		Column::Number(NumberColumn::new("y".to_owned(), y)),
		Column::Enum(EnumColumn::new(
			"c".to_owned(),
			vec!["a".to_owned(), "b".to_owned(), "c".to_owned(), "d".to_owned()],
			c,
		)),
	])
	.unwrap()
}

fn forest() -> Forest {
	let inbag = |tree: usize| Some((0..N_ROWS).map(|i| ((i + tree) % 3) as u32).collect());
	let trees = vec![
		// 0: x <= 5 ? 1 : 2, 1: c <= 2.5 ? 3 : 4, 2: y <= 0 ? 5 : 6
		TreeArrays {
			split_feature_indexes: vec![0, 2, 1, 0, 0, 0, 0],
			split_values: vec![5.0, 2.5, 0.0, 0.0, 0.0, 0.0, 0.0],
			left_child_ids: vec![1, 3, 5, 0, 0, 0, 0],
			right_child_ids: vec![2, 4, 6, 0, 0, 0, 0],
			missing_values_directions: None,
			inbag_counts: inbag(0),
		},
		// 0: y <= 1 ? 1 : 2, 2 passes through to 3, 3: x <= 7 ? 4 : 5
		TreeArrays {
			split_feature_indexes: vec![1, 0, 1, 0, 0, 0],
			split_values: vec![1.0, 0.0, 3.0, 7.0, 0.0, 0.0],
			left_child_ids: vec![1, 0, 3, 4, 0, 0],
			right_child_ids: vec![2, 0, 3, 5, 0, 0],
			missing_values_directions: None,
			inbag_counts: inbag(1),
		},
		// 0: c <= 1.5 ? 1 : 2, 2: x <= 2 ? 3 : 4
		TreeArrays {
			split_feature_indexes: vec![2, 0, 0, 0, 0],
			split_values: vec![1.5, 0.0, 2.0, 0.0, 0.0],
			left_child_ids: vec![1, 0, 3, 0, 0],
			right_child_ids: vec![2, 0, 4, 0, 0],
			missing_values_directions: None,
			inbag_counts: inbag(2),
		},
	];
	Forest::from_arrays(trees, 3, N_ROWS).unwrap()
}

fn categorical_groups(circuit: &Circuit) -> BTreeMap<(usize, usize), Vec<&CategoricalParams>> {
	let mut groups: BTreeMap<(usize, usize), Vec<&CategoricalParams>> = BTreeMap::new();
	for row in circuit.categorical.iter() {
		groups.entry((row.f_idx, row.variable)).or_default().push(row);
	}
	groups
}

fn assert_well_formed(circuit: &Circuit) {
	// Coverage sums to one per tree.
	let mut coverage_sums: BTreeMap<usize, f64> = BTreeMap::new();
	for leaf in circuit.leaves.iter() {
		assert!(leaf.coverage > 0.0 && leaf.coverage <= 1.0);
		*coverage_sums.entry(leaf.tree).or_insert(0.0) += leaf.coverage;
	}
	for (tree, sum) in coverage_sums {
		assert!((sum - 1.0).abs() < 1e-9, "tree {} coverage sums to {}", tree, sum);
	}
	// f_idx is dense and ordered.
	for (position, leaf) in circuit.leaves.iter().enumerate() {
		assert_eq!(leaf.f_idx, position + 1);
	}
	for row in circuit.continuous.iter() {
		assert!(row.na_share >= 0.0 && row.na_share <= 1.0);
		assert!(row.min <= row.max);
		if let ContinuousDistribution::TruncatedNormal { sigma, .. } = row.distribution {
			assert!(sigma > 0.0, "sigma is {} for {:?}", sigma, row);
		}
	}
	for (key, rows) in categorical_groups(circuit) {
		let sum: f64 = rows.iter().map(|row| row.prob).sum();
		assert!((sum - 1.0).abs() < 1e-9, "{:?} sums to {}", key, sum);
		for row in rows {
			assert!(row.na_share >= 0.0 && row.na_share <= 1.0);
		}
	}
}

#[test]
fn test_constant_leaf() {
	init_logger();
	let features = DataFrame::new(vec![Column::Number(NumberColumn::new(
		"x".to_owned(),
		vec![5.0; 10],
	))])
	.unwrap();
	let forest = Forest::from_arrays(vec![leaf_only_tree(None)], 1, 10).unwrap();
	let circuit = estimate(&forest, &features, &EstimateOptions::default()).unwrap();
	assert_eq!(circuit.continuous.len(), 1);
	let row = &circuit.continuous[0];
	assert!(row.min <= 5.0 && 5.0 <= row.max);
	assert_eq!(row.na_share, 0.0);
	match row.distribution {
		ContinuousDistribution::TruncatedNormal { mu, sigma } => {
			assert!((mu - 5.0).abs() < 1e-12);
			assert!(sigma > 0.0);
		}
		_ => panic!("expected a truncated normal"),
	}
	assert_eq!(circuit.leaves.len(), 1);
	assert_eq!(circuit.leaves[0].coverage, 1.0);
	assert_eq!(circuit.metadata[0].decimals, Some(0));
	assert_eq!(circuit.continuous_params(1, 0), Some(row));
	assert_eq!(circuit.continuous_params(1, 1), None);
	assert_eq!(circuit.continuous_params(2, 0), None);
}

#[test]
fn test_laplace_smoothing_covers_unobserved_levels() {
	init_logger();
	let features = DataFrame::new(vec![Column::Enum(EnumColumn::from_strs(
		"letter".to_owned(),
		vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
		&[Some("a"), Some("a")],
	))])
	.unwrap();
	let forest = Forest::from_arrays(vec![leaf_only_tree(None)], 1, 2).unwrap();
	let options = EstimateOptions {
		alpha: 1.0,
		..Default::default()
	};
	let circuit = estimate(&forest, &features, &options).unwrap();
	let probs: BTreeMap<usize, f64> = circuit
		.categorical
		.iter()
		.map(|row| (row.level, row.prob))
		.collect();
	let expected = btreemap! { 1 => 0.6, 2 => 0.2, 3 => 0.2 };
	assert_eq!(probs.len(), expected.len());
	for (level, prob) in expected {
		assert!((probs[&level] - prob).abs() < 1e-12);
	}
	assert_eq!(circuit.metadata[0].family, Family::Multinomial);
	assert_eq!(circuit.metadata[0].class, VariableClass::Factor);
}

#[test]
fn test_out_of_bag_requires_the_training_rows() {
	init_logger();
	let options = EstimateOptions {
		sampling: SamplingPolicy::OutOfBag,
		..Default::default()
	};
	let result = estimate(&forest(), &features(30), &options);
	assert!(matches!(result, Err(Error::Configuration(_))));
	// A dataset holding half of the training rows is accepted for honest forests.
	let circuit = estimate(&forest(), &features(N_ROWS / 2), &options).unwrap();
	assert_well_formed(&circuit);
}

#[test]
fn test_fully_missing_categorical_leaf() {
	init_logger();
	// x <= 2.5 ? 1 : 2, and every row with x <= 2.5 is missing its color.
	let tree = TreeArrays {
		split_feature_indexes: vec![0, 0, 0],
		split_values: vec![2.5, 0.0, 0.0],
		left_child_ids: vec![1, 0, 0],
		right_child_ids: vec![2, 0, 0],
		missing_values_directions: None,
		inbag_counts: None,
	};
	let features = DataFrame::new(vec![
		Column::Number(NumberColumn::new(
			"x".to_owned(),
			vec![1.0, 2.0, 3.0, 4.0],
		)),
		Column::Enum(EnumColumn::from_strs(
			"color".to_owned(),
			vec!["red".to_owned(), "green".to_owned(), "blue".to_owned()],
			&[None, None, Some("red"), Some("blue")],
		)),
	])
	.unwrap();
	let forest = Forest::from_arrays(vec![tree], 2, 4).unwrap();
	let circuit = estimate(&forest, &features, &EstimateOptions::default()).unwrap();
	let f_idx = circuit
		.leaves
		.iter()
		.find(|leaf| leaf.leaf == 1)
		.unwrap()
		.f_idx;
	let rows = circuit.categorical_group(f_idx, 1);
	assert_eq!(
		rows.iter().map(|row| row.level).collect::<Vec<_>>(),
		vec![1, 2, 3]
	);
	for row in rows {
		assert_eq!(row.na_share, 1.0);
		assert!((row.prob - 1.0 / 3.0).abs() < 1e-12);
	}
	// Without smoothing, the other leaf only has its observed levels.
	let other = circuit.categorical_group(f_idx + 1, 1);
	assert_eq!(
		other
			.iter()
			.map(|row| (row.level, row.prob))
			.collect::<Vec<_>>(),
		vec![(1, 0.5), (3, 0.5)]
	);
}

#[test]
fn test_properties_hold_for_every_policy() {
	init_logger();
	let forest = forest();
	let features = features(N_ROWS);
	for sampling in [
		SamplingPolicy::All,
		SamplingPolicy::OutOfBag,
		SamplingPolicy::InBag,
	]
	.iter()
	{
		for finite_bounds in [FiniteBounds::None, FiniteBounds::Local, FiniteBounds::Global].iter() {
			let options = EstimateOptions {
				sampling: *sampling,
				finite_bounds: *finite_bounds,
				alpha: 0.5,
				epsilon: 0.1,
				..Default::default()
			};
			let circuit = estimate(&forest, &features, &options).unwrap();
			assert_well_formed(&circuit);
			// With smoothing, every level a leaf admits has positive probability.
			for row in circuit.categorical.iter() {
				assert!(row.prob > 0.0);
			}
			if *finite_bounds != FiniteBounds::None {
				for row in circuit.continuous.iter() {
					assert!(row.interval().is_finite(), "{:?} is not finite", row);
				}
			}
		}
	}
}

#[test]
fn test_rows_fall_within_their_leaf_bounds() {
	let forest = forest();
	let features = features(N_ROWS);
	let circuit = estimate(&forest, &features, &EstimateOptions::default()).unwrap();
	for (tree_index, tree) in forest.trees.iter().enumerate() {
		for (row_index, leaf_index) in tree.terminal_nodes(&features).into_iter().enumerate() {
			let leaf = circuit
				.leaves
				.iter()
				.find(|leaf| leaf.tree == tree_index && leaf.leaf == leaf_index)
				.unwrap();
			for (column, bounds) in features.columns.iter().zip(leaf.bounds.iter()) {
				if let Some(value) = column.value(row_index).as_split_value() {
					assert!(value > bounds.min || bounds.min.is_infinite());
					assert!(value <= bounds.max);
				}
			}
		}
	}
}

#[test]
fn test_uniform_family() {
	init_logger();
	let options = EstimateOptions {
		family: ContinuousFamily::Uniform,
		..Default::default()
	};
	let circuit = estimate(&forest(), &features(N_ROWS), &options).unwrap();
	assert_well_formed(&circuit);
	for row in circuit.continuous.iter() {
		assert_eq!(row.distribution, ContinuousDistribution::Uniform);
		assert!(row.interval().is_finite());
	}
	assert_eq!(circuit.metadata[0].family, Family::Uniform);
}

#[test]
fn test_estimation_is_deterministic() {
	let forest = forest();
	let features = features(N_ROWS);
	let options = EstimateOptions {
		alpha: 0.1,
		finite_bounds: FiniteBounds::Local,
		..Default::default()
	};
	let a = serde_json::to_string(&estimate(&forest, &features, &options).unwrap()).unwrap();
	let b = serde_json::to_string(&estimate(&forest, &features, &options).unwrap()).unwrap();
	assert_eq!(a, b);
	let sequential = EstimateOptions {
		parallel: false,
		..options
	};
	let c = serde_json::to_string(&estimate(&forest, &features, &sequential).unwrap()).unwrap();
	assert_eq!(a, c);
}

#[test]
fn test_invalid_inputs() {
	let forest = forest();
	let mut features = features(N_ROWS);
	if let Column::Number(column) = &mut features.columns[1] {
		column.data[3] = std::f64::INFINITY;
	}
	assert!(matches!(
		estimate(&forest, &features, &EstimateOptions::default()),
		Err(Error::Data(_))
	));
	let features = DataFrame::new(vec![Column::Number(NumberColumn::new(
		"x".to_owned(),
		vec![1.0],
	))])
	.unwrap();
	assert!(matches!(
		estimate(&forest, &features, &EstimateOptions::default()),
		Err(Error::Data(_))
	));
	let options = EstimateOptions {
		alpha: -0.5,
		..Default::default()
	};
	assert!(matches!(
		estimate(&forest, &self::features(N_ROWS), &options),
		Err(Error::Configuration(_))
	));
}

#[test]
fn test_in_bag_requires_counts() {
	let features = DataFrame::new(vec![Column::Number(NumberColumn::new(
		"x".to_owned(),
		vec![1.0, 2.0],
	))])
	.unwrap();
	let forest = Forest::from_arrays(vec![leaf_only_tree(None)], 1, 2).unwrap();
	let options = EstimateOptions {
		sampling: SamplingPolicy::InBag,
		..Default::default()
	};
	assert!(matches!(
		estimate(&forest, &features, &options),
		Err(Error::Configuration(_))
	));
}

#[test]
fn test_metadata_and_schema() {
	let circuit = estimate(&forest(), &features(N_ROWS), &EstimateOptions::default()).unwrap();
	let metadata: Vec<(&str, Option<usize>)> = circuit
		.metadata
		.iter()
		.map(|metadata| (metadata.name.as_str(), metadata.decimals))
		.collect();
	assert_eq!(metadata, vec![("x", Some(1)), ("y", Some(0)), ("c", None)]);
	assert_eq!(
		circuit.schema,
		vec![
			("x".to_owned(), ColumnType::Number),
			("y".to_owned(), ColumnType::Number),
			(
				"c".to_owned(),
				ColumnType::Enum {
					options: vec!["a".to_owned(), "b".to_owned(), "c".to_owned(), "d".to_owned()],
				},
			),
		]
	);
}

#[test]
fn test_leaf_reached_only_by_missing_values() {
	init_logger();
	// x <= 2 ? 1 : 2, but every observed x is above 2, so only the missing row lands in leaf 1.
	let tree = TreeArrays {
		split_feature_indexes: vec![0, 0, 0],
		split_values: vec![2.0, 0.0, 0.0],
		left_child_ids: vec![1, 0, 0],
		right_child_ids: vec![2, 0, 0],
		missing_values_directions: None,
		inbag_counts: None,
	};
	let features = DataFrame::new(vec![Column::Number(NumberColumn::new(
		"x".to_owned(),
		vec![3.0, 4.0, std::f64::NAN],
	))])
	.unwrap();
	let forest = Forest::from_arrays(vec![tree], 1, 3).unwrap();
	for finite_bounds in [FiniteBounds::None, FiniteBounds::Local, FiniteBounds::Global].iter() {
		for family in [ContinuousFamily::TruncatedNormal, ContinuousFamily::Uniform].iter() {
			let options = EstimateOptions {
				family: *family,
				finite_bounds: *finite_bounds,
				epsilon: 0.1,
				..Default::default()
			};
			let circuit = estimate(&forest, &features, &options).unwrap();
			assert_well_formed(&circuit);
			let row = circuit.continuous_params(1, 0).unwrap();
			assert_eq!(row.na_share, 1.0);
			assert!(row.min < row.max, "{:?}", row);
			assert!(row.interval().is_finite());
			if let ContinuousDistribution::TruncatedNormal { mu, .. } = row.distribution {
				assert!(row.min <= mu && mu <= row.max, "{:?}", row);
			}
		}
	}
}
