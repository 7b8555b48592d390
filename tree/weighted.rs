/*!
The gradient/hessian-weighted tree builder used by the boosting engine. Split scoring and leaf values use hessian-weighted statistics: a group of rows scores `G²/(H + λ)` and a leaf outputs the regularized Newton step `−G/(H + λ)`, where `G` and `H` are the sums of the gradients and hessians of the rows in the group.
*/

use crate::{
	node::{BinaryNode, LeafNode, MultiwayBranch, MultiwayNode, TreeNode},
	partition::{distinct_numbers, midpoints, partition_by_threshold, partition_by_value},
};
use arbor_data::{is_continuous, FeatureTypes, Row, Value};
use num_traits::ToPrimitive;

#[derive(Debug, Clone)]
pub struct WeightedTreeOptions {
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
	/// The minimum sum of hessians each child of a split must carry.
	pub min_child_weight: f64,
	/// The L2 regularization term added to the hessian sum in scores and leaf values.
	pub reg_lambda: f64,
}

struct Candidate {
	attribute_index: usize,
	gain: f64,
	threshold: Option<f64>,
	group_value: Option<Value>,
	left: Vec<usize>,
	right: Vec<usize>,
}

/// Recursively build a weighted tree over the rows selected by `indices`. `gradients` and `hessians` are indexed by row position in `rows`.
pub fn build(
	rows: &[Row],
	indices: &[usize],
	attributes: &[String],
	feature_types: &FeatureTypes,
	gradients: &[f64],
	hessians: &[f64],
	depth: usize,
	options: &WeightedTreeOptions,
) -> TreeNode {
	let n = indices.len();
	let (sum_gradients, sum_hessians) = sums(indices, gradients, hessians);
	let leaf = |n: usize| {
		TreeNode::Leaf(LeafNode {
			value: Value::Number(leaf_weight(
				sum_gradients,
				sum_hessians,
				options.reg_lambda,
			)),
			samples: n,
		})
	};
	if n == 0 {
		return TreeNode::Leaf(LeafNode {
			value: Value::Number(0.0),
			samples: 0,
		});
	}
	if attributes.is_empty() || depth >= options.max_depth || n < options.min_samples_split {
		return leaf(n);
	}
	let parent_score = score(sum_gradients, sum_hessians, options.reg_lambda);
	let mut best: Option<Candidate> = None;
	for (attribute_index, attribute) in attributes.iter().enumerate() {
		if is_continuous(feature_types, attribute) {
			for threshold in midpoints(&distinct_numbers(rows, indices, attribute)) {
				let (left, right) = partition_by_threshold(rows, indices, attribute, threshold);
				if let Some(gain) =
					split_gain(&left, &right, gradients, hessians, parent_score, options)
				{
					if best.as_ref().map_or(true, |best| gain > best.gain) {
						best = Some(Candidate {
							attribute_index,
							gain,
							threshold: Some(threshold),
							group_value: None,
							left,
							right,
						});
					}
				}
			}
		} else {
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
				if let Some(gain) =
					split_gain(&left, &right, gradients, hessians, parent_score, options)
				{
					if best.as_ref().map_or(true, |best| gain > best.gain) {
						best = Some(Candidate {
							attribute_index,
							gain,
							threshold: None,
							group_value: Some(value.clone()),
							left,
							right,
						});
					}
				}
			}
		}
	}
	let candidate = match best {
		Some(candidate) if candidate.gain > 0.0 => candidate,
		_ => return leaf(n),
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
		&remaining,
		feature_types,
		gradients,
		hessians,
		depth + 1,
		options,
	);
	let right_child = build(
		rows,
		&candidate.right,
		&remaining,
		feature_types,
		gradients,
		hessians,
		depth + 1,
		options,
	);
	match (candidate.threshold, candidate.group_value) {
		(Some(threshold), _) => TreeNode::Binary(BinaryNode {
			attribute: attribute.clone(),
			gain: candidate.gain,
			samples: n,
			threshold,
			left: Box::new(left_child),
			right: Box::new(right_child),
		}),
		(None, Some(group_value)) => {
			let partitions = partition_by_value(rows, indices, attribute);
			let branches = partitions
				.into_iter()
				.map(|(branch_value, partition)| {
					let child = if branch_value == group_value {
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
			TreeNode::Multiway(MultiwayNode {
				attribute: attribute.clone(),
				gain: candidate.gain,
				samples: n,
				branches,
			})
		}
		(None, None) => unreachable!(),
	}
}

/// The L2-regularized optimal constant output for a leaf.
pub fn leaf_weight(sum_gradients: f64, sum_hessians: f64, reg_lambda: f64) -> f64 {
	-sum_gradients / (sum_hessians + reg_lambda)
}

fn score(sum_gradients: f64, sum_hessians: f64, reg_lambda: f64) -> f64 {
	sum_gradients * sum_gradients / (sum_hessians + reg_lambda)
}

fn sums(indices: &[usize], gradients: &[f64], hessians: &[f64]) -> (f64, f64) {
	let mut sum_gradients = 0.0;
	let mut sum_hessians = 0.0;
	for &index in indices {
		sum_gradients += gradients[index];
		sum_hessians += hessians[index];
	}
	(sum_gradients, sum_hessians)
}

/// Score a candidate binary split, or return `None` if either child violates the leaf-size or hessian-weight constraints.
fn split_gain(
	left: &[usize],
	right: &[usize],
	gradients: &[f64],
	hessians: &[f64],
	parent_score: f64,
	options: &WeightedTreeOptions,
) -> Option<f64> {
	if left.len() < options.min_samples_leaf || right.len() < options.min_samples_leaf {
		return None;
	}
	let (left_gradients, left_hessians) = sums(left, gradients, hessians);
	let (right_gradients, right_hessians) = sums(right, gradients, hessians);
	if left_hessians < options.min_child_weight || right_hessians < options.min_child_weight {
		return None;
	}
	let gain = 0.5
		* (score(left_gradients, left_hessians, options.reg_lambda)
			+ score(right_gradients, right_hessians, options.reg_lambda)
			- parent_score);
	Some(gain)
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn test_options() -> WeightedTreeOptions {
	WeightedTreeOptions {
		max_depth: 3,
		min_samples_split: 2,
		min_samples_leaf: 1,
		min_child_weight: 0.0,
		reg_lambda: 1.0,
	}
}

#[test]
fn test_leaf_weight_is_regularized_newton_step() {
	assert_eq!(leaf_weight(-6.0, 2.0, 1.0), 2.0);
	assert_eq!(leaf_weight(0.0, 4.0, 1.0), 0.0);
}

#[test]
fn test_pure_gradient_signal_splits_and_outputs_leaf_weights() {
	let rows: Vec<Row> = (1..=4)
		.map(|x| btreemap! { "x".to_owned() => Value::from(x as f64) })
		.collect();
	let feature_types = btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous };
	let indices = vec![0, 1, 2, 3];
	let attributes = vec!["x".to_owned()];
	// Rows 0 and 1 pull the prediction up, rows 2 and 3 pull it down.
	let gradients = vec![-1.0, -1.0, 1.0, 1.0];
	let hessians = vec![1.0, 1.0, 1.0, 1.0];
	let tree = build(
		&rows,
		&indices,
		&attributes,
		&feature_types,
		&gradients,
		&hessians,
		0,
		&test_options(),
	);
	match tree {
		TreeNode::Binary(node) => {
			assert!(node.threshold > 2.0 && node.threshold < 3.0);
			// Each side has G = ±2, H = 2, so the leaf weight is ∓2/(2+1).
			assert_eq!(
				*node.left,
				TreeNode::Leaf(LeafNode {
					value: Value::Number(2.0 / 3.0),
					samples: 2,
				})
			);
			assert_eq!(
				*node.right,
				TreeNode::Leaf(LeafNode {
					value: Value::Number(-2.0 / 3.0),
					samples: 2,
				})
			);
		}
		_ => panic!("expected a binary split"),
	}
}

#[test]
fn test_zero_gradients_yield_a_single_leaf() {
	let rows: Vec<Row> = (1..=4)
		.map(|x| btreemap! { "x".to_owned() => Value::from(x as f64) })
		.collect();
	let feature_types = btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous };
	let indices = vec![0, 1, 2, 3];
	let attributes = vec!["x".to_owned()];
	let gradients = vec![0.0; 4];
	let hessians = vec![1.0; 4];
	let tree = build(
		&rows,
		&indices,
		&attributes,
		&feature_types,
		&gradients,
		&hessians,
		0,
		&test_options(),
	);
	assert_eq!(
		tree,
		TreeNode::Leaf(LeafNode {
			value: Value::Number(0.0),
			samples: 4,
		})
	);
}

#[test]
fn test_min_child_weight_blocks_splits() {
	let rows: Vec<Row> = (1..=4)
		.map(|x| btreemap! { "x".to_owned() => Value::from(x as f64) })
		.collect();
	let feature_types = btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous };
	let indices = vec![0, 1, 2, 3];
	let attributes = vec!["x".to_owned()];
	let gradients = vec![-1.0, -1.0, 1.0, 1.0];
	let hessians = vec![0.1; 4];
	let options = WeightedTreeOptions {
		min_child_weight: 1.0,
		..test_options()
	};
	let tree = build(
		&rows,
		&indices,
		&attributes,
		&feature_types,
		&gradients,
		&hessians,
		0,
		&options,
	);
	assert!(tree.is_leaf());
}
