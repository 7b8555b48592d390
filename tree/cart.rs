/*!
The continuous/mixed tree builder. Numeric attributes get binary threshold splits, scored at every midpoint between adjacent distinct values. Discrete attributes get a single binary grouping rather than a full multiway split, which keeps the split search homogeneous with the continuous case. The impurity criterion is configurable: gini or entropy for classification, mse or mae for regression.
*/

use crate::{
	criteria::{self, Criterion},
	node::{BinaryNode, LeafNode, MultiwayBranch, MultiwayNode, TreeNode},
	partition::{distinct_numbers, midpoints, partition_by_threshold, partition_by_value},
	TrainError, TreeOptions,
};
use arbor_data::{is_continuous, value_of, FeatureTypes, Row, Value};
use num_traits::ToPrimitive;

enum CandidateKind {
	Continuous { threshold: f64 },
	Discrete { value: Value },
}

struct Candidate {
	attribute_index: usize,
	gain: f64,
	kind: CandidateKind,
	left: Vec<usize>,
	right: Vec<usize>,
}

/// Recursively build a tree over the rows selected by `indices`. A model cannot be built over zero rows, so an empty selection at the root is an error.
pub fn build(
	rows: &[Row],
	indices: &[usize],
	target: &str,
	attributes: &[String],
	feature_types: &FeatureTypes,
	depth: usize,
	options: &TreeOptions,
) -> Result<TreeNode, TrainError> {
	let n = indices.len();
	if n == 0 {
		return Err(TrainError::EmptyTrainingData);
	}
	let labels: Vec<&Value> = indices
		.iter()
		.map(|&index| value_of(&rows[index], target))
		.collect();
	// A single row or a constant target yields a leaf directly.
	if n == 1 || labels.iter().all(|label| *label == labels[0]) {
		return Ok(TreeNode::Leaf(LeafNode {
			value: leaf_value(options.criterion, &labels),
			samples: n,
		}));
	}
	if attributes.is_empty() || depth >= options.max_depth || n < options.min_samples_split {
		return Ok(TreeNode::Leaf(LeafNode {
			value: leaf_value(options.criterion, &labels),
			samples: n,
		}));
	}
	let parent_impurity = options.criterion.impurity(&labels);
	let mut best: Option<Candidate> = None;
	for (attribute_index, attribute) in attributes.iter().enumerate() {
		if is_continuous(feature_types, attribute) {
			// Evaluate every midpoint between adjacent sorted distinct values as a threshold.
			for threshold in midpoints(&distinct_numbers(rows, indices, attribute)) {
				let (left, right) = partition_by_threshold(rows, indices, attribute, threshold);
				if left.len() < options.min_samples_leaf || right.len() < options.min_samples_leaf
				{
					continue;
				}
				let gain = binary_gain(
					options.criterion,
					parent_impurity,
					rows,
					target,
					n,
					&left,
					&right,
				);
				if best.as_ref().map_or(true, |best| gain > best.gain) {
					best = Some(Candidate {
						attribute_index,
						gain,
						kind: CandidateKind::Continuous { threshold },
						left,
						right,
					});
				}
			}
		} else {
			// Evaluate a binary grouping for each observed value: that value against the rest.
			let partitions = partition_by_value(rows, indices, attribute);
			if partitions.len() < 2 {
				continue;
			}
			for (value, partition) in partitions.iter() {
				let left = partition.clone();
				let right: Vec<usize> = partitions
					.iter()
					.filter(|(other, _)| other != value)
					.flat_map(|(_, partition)| partition.iter().copied())
					.collect();
				if left.len() < options.min_samples_leaf || right.len() < options.min_samples_leaf
				{
					continue;
				}
				let gain = binary_gain(
					options.criterion,
					parent_impurity,
					rows,
					target,
					n,
					&left,
					&right,
				);
				if best.as_ref().map_or(true, |best| gain > best.gain) {
					best = Some(Candidate {
						attribute_index,
						gain,
						kind: CandidateKind::Discrete {
							value: value.clone(),
						},
						left,
						right,
					});
				}
			}
		}
	}
	// A candidate split with non-positive gain is worse than keeping a leaf.
	let candidate = match best {
		Some(candidate) if candidate.gain > 0.0 => candidate,
		_ => {
			return Ok(TreeNode::Leaf(LeafNode {
				value: leaf_value(options.criterion, &labels),
				samples: n,
			}))
		}
	};
	let attribute = &attributes[candidate.attribute_index];
	let remaining: Vec<String> = attributes
		.iter()
		.enumerate()
		.filter(|(index, _)| *index != candidate.attribute_index)
		.map(|(_, attribute)| attribute.clone())
		.collect();
	let left_child = build(
		rows,
		&candidate.left,
		target,
		&remaining,
		feature_types,
		depth + 1,
		options,
	)?;
	let right_child = build(
		rows,
		&candidate.right,
		target,
		&remaining,
		feature_types,
		depth + 1,
		options,
	)?;
	match candidate.kind {
		CandidateKind::Continuous { threshold } => Ok(TreeNode::Binary(BinaryNode {
			attribute: attribute.clone(),
			gain: candidate.gain,
			samples: n,
			threshold,
			left: Box::new(left_child),
			right: Box::new(right_child),
		})),
		CandidateKind::Discrete { value } => {
			// The grouping is scored as a binary split, but the emitted node keeps one branch per observed value so that prediction stays an exact-match lookup. Branches in the same group share a subtree.
			let partitions = partition_by_value(rows, indices, attribute);
			let branches = partitions
				.into_iter()
				.map(|(branch_value, partition)| {
					let child = if branch_value == value {
						left_child.clone()
					} else {
						right_child.clone()
					};
					MultiwayBranch {
						samples: partition.len(),
						fraction: partition.len().to_f64().unwrap() / n.to_f64().unwrap(),
						value: branch_value,
						child,
					}
				})
				.collect();
			Ok(TreeNode::Multiway(MultiwayNode {
				attribute: attribute.clone(),
				gain: candidate.gain,
				samples: n,
				branches,
			}))
		}
	}
}

/// The leaf value for a partition: the most frequent label for the classification criteria, the mean of the numeric targets for the regression criteria.
fn leaf_value(criterion: Criterion, labels: &[&Value]) -> Value {
	if criterion.is_regression() {
		let numbers: Vec<f64> = labels.iter().filter_map(|label| label.as_number()).collect();
		Value::Number(criteria::mean(&numbers))
	} else {
		criteria::mode(labels)
	}
}

fn binary_gain(
	criterion: Criterion,
	parent_impurity: f64,
	rows: &[Row],
	target: &str,
	parent_size: usize,
	left: &[usize],
	right: &[usize],
) -> f64 {
	let left_labels: Vec<&Value> = left
		.iter()
		.map(|&index| value_of(&rows[index], target))
		.collect();
	let right_labels: Vec<&Value> = right
		.iter()
		.map(|&index| value_of(&rows[index], target))
		.collect();
	criteria::information_gain(
		criterion,
		parent_impurity,
		parent_size,
		&[left_labels, right_labels],
	)
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn continuous_types() -> FeatureTypes {
	btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous }
}

#[cfg(test)]
fn threshold_rows() -> Vec<Row> {
	(1..=6)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(if x <= 3 { "lo" } else { "hi" }),
			}
		})
		.collect()
}

#[test]
fn test_separable_continuous_attribute_splits_between_three_and_four() {
	let rows = threshold_rows();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["x".to_owned()];
	let tree = build(
		&rows,
		&indices,
		"y",
		&attributes,
		&continuous_types(),
		0,
		&TreeOptions::default(),
	)
	.unwrap();
	match tree {
		TreeNode::Binary(node) => {
			assert_eq!(node.attribute, "x");
			assert!(node.threshold > 3.0 && node.threshold < 4.0);
			assert_eq!(
				*node.left,
				TreeNode::Leaf(LeafNode {
					value: Value::from("lo"),
					samples: 3,
				})
			);
			assert_eq!(
				*node.right,
				TreeNode::Leaf(LeafNode {
					value: Value::from("hi"),
					samples: 3,
				})
			);
		}
		_ => panic!("expected a binary split"),
	}
}

#[test]
fn test_regression_criterion_uses_mean_leaves() {
	let rows: Vec<Row> = (1..=6)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(if x <= 3 { 10.0 } else { 20.0 }),
			}
		})
		.collect();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["x".to_owned()];
	let options = TreeOptions {
		criterion: Criterion::Mse,
		..TreeOptions::default()
	};
	let tree = build(
		&rows,
		&indices,
		"y",
		&attributes,
		&continuous_types(),
		0,
		&options,
	)
	.unwrap();
	match tree {
		TreeNode::Binary(node) => {
			assert!(node.threshold > 3.0 && node.threshold < 4.0);
			match (*node.left, *node.right) {
				(TreeNode::Leaf(left), TreeNode::Leaf(right)) => {
					assert_eq!(left.value, Value::from(10.0));
					assert_eq!(right.value, Value::from(20.0));
				}
				_ => panic!("expected pure leaves"),
			}
		}
		_ => panic!("expected a binary split"),
	}
}

#[test]
fn test_discrete_attribute_gets_a_grouped_split() {
	let rows: Vec<Row> = vec![
		("red", "warm"),
		("red", "warm"),
		("blue", "cool"),
		("green", "cool"),
		("blue", "cool"),
		("green", "cool"),
	]
	.into_iter()
	.map(|(color, label)| {
		btreemap! {
			"color".to_owned() => Value::from(color),
			"label".to_owned() => Value::from(label),
		}
	})
	.collect();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["color".to_owned()];
	let tree = build(
		&rows,
		&indices,
		"label",
		&attributes,
		&FeatureTypes::new(),
		0,
		&TreeOptions::default(),
	)
	.unwrap();
	match tree {
		TreeNode::Multiway(node) => {
			assert_eq!(node.attribute, "color");
			assert_eq!(node.branches.len(), 3);
			// "red" against the rest separates the labels perfectly, so both group subtrees are pure leaves.
			let tree = TreeNode::Multiway(node);
			for row in rows.iter() {
				let prediction = crate::predict::predict(&tree, row);
				assert_eq!(prediction, value_of(row, "label"));
			}
		}
		_ => panic!("expected a grouped multiway split"),
	}
}

#[test]
fn test_min_samples_leaf_rejects_unbalanced_thresholds() {
	let rows = threshold_rows();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["x".to_owned()];
	let options = TreeOptions {
		min_samples_leaf: 3,
		..TreeOptions::default()
	};
	let tree = build(
		&rows,
		&indices,
		"y",
		&attributes,
		&continuous_types(),
		0,
		&options,
	)
	.unwrap();
	// Only the 3/3 threshold survives the leaf-size constraint.
	match tree {
		TreeNode::Binary(node) => assert!(node.threshold > 3.0 && node.threshold < 4.0),
		_ => panic!("expected a binary split"),
	}
}

#[test]
fn test_empty_rows_are_an_error() {
	let rows: Vec<Row> = Vec::new();
	let result = build(
		&rows,
		&[],
		"y",
		&[],
		&FeatureTypes::new(),
		0,
		&TreeOptions::default(),
	);
	assert!(matches!(result, Err(TrainError::EmptyTrainingData)));
}
