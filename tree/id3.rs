/*!
The discrete tree builder. It recursively partitions rows by every distinct value of the attribute with the greatest information gain, measured with entropy, and emits multiway split nodes. Attributes are consumed as the recursion descends.
*/

use crate::{
	criteria::{self, Criterion},
	node::{LeafNode, MultiwayBranch, MultiwayNode, TreeNode},
	partition::partition_by_value,
	TreeOptions,
};
use arbor_data::{value_of, Row, Value};
use num_traits::ToPrimitive;

/// Recursively build a multiway tree over the rows selected by `indices`. An empty selection yields a degenerate empty leaf rather than an error, which keeps the bare single-tree build permissive.
pub fn build(
	rows: &[Row],
	indices: &[usize],
	target: &str,
	attributes: &[String],
	depth: usize,
	options: &TreeOptions,
) -> TreeNode {
	let n = indices.len();
	if n == 0 {
		return TreeNode::Leaf(LeafNode {
			value: Value::Unknown,
			samples: 0,
		});
	}
	let labels: Vec<&Value> = indices
		.iter()
		.map(|&index| value_of(&rows[index], target))
		.collect();
	// If every row shares one target value there is nothing left to split.
	if labels.iter().all(|label| *label == labels[0]) {
		return TreeNode::Leaf(LeafNode {
			value: labels[0].clone(),
			samples: n,
		});
	}
	if attributes.is_empty() || depth >= options.max_depth || n < options.min_samples_split {
		return TreeNode::Leaf(LeafNode {
			value: criteria::mode(&labels),
			samples: n,
		});
	}
	// Score every remaining attribute by information gain. Ties go to the attribute supplied first.
	let parent_impurity = criteria::entropy(&labels);
	let mut best: Option<(usize, f64, Vec<(Value, Vec<usize>)>)> = None;
	for (attribute_index, attribute) in attributes.iter().enumerate() {
		let partitions = partition_by_value(rows, indices, attribute);
		if partitions.len() < 2 {
			continue;
		}
		let children: Vec<Vec<&Value>> = partitions
			.iter()
			.map(|(_, partition)| {
				partition
					.iter()
					.map(|&index| value_of(&rows[index], target))
					.collect()
			})
			.collect();
		let gain =
			criteria::information_gain(Criterion::Entropy, parent_impurity, n, &children);
		if best
			.as_ref()
			.map_or(true, |(_, best_gain, _)| gain > *best_gain)
		{
			best = Some((attribute_index, gain, partitions));
		}
	}
	// A split is only worth taking over a leaf if it strictly reduces impurity.
	let (attribute_index, gain, partitions) = match best {
		Some(best) if best.1 > 0.0 => best,
		_ => {
			return TreeNode::Leaf(LeafNode {
				value: criteria::mode(&labels),
				samples: n,
			})
		}
	};
	let remaining: Vec<String> = attributes
		.iter()
		.enumerate()
		.filter(|(index, _)| *index != attribute_index)
		.map(|(_, attribute)| attribute.clone())
		.collect();
	let branches = partitions
		.into_iter()
		.map(|(value, partition)| {
			let child = build(rows, &partition, target, &remaining, depth + 1, options);
			MultiwayBranch {
				value,
				samples: partition.len(),
				fraction: partition.len().to_f64().unwrap() / n.to_f64().unwrap(),
				child,
			}
		})
		.collect();
	TreeNode::Multiway(MultiwayNode {
		attribute: attributes[attribute_index].clone(),
		gain,
		samples: n,
		branches,
	})
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn weather_rows() -> Vec<Row> {
	vec![
		btreemap! {
			"outlook".to_owned() => Value::from("sunny"),
			"play".to_owned() => Value::from("no"),
		},
		btreemap! {
			"outlook".to_owned() => Value::from("overcast"),
			"play".to_owned() => Value::from("yes"),
		},
		btreemap! {
			"outlook".to_owned() => Value::from("rain"),
			"play".to_owned() => Value::from("yes"),
		},
		btreemap! {
			"outlook".to_owned() => Value::from("sunny"),
			"play".to_owned() => Value::from("no"),
		},
	]
}

#[test]
fn test_separable_single_attribute_fits_training_data() {
	let rows = weather_rows();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["outlook".to_owned()];
	let tree = build(
		&rows,
		&indices,
		"play",
		&attributes,
		0,
		&TreeOptions::default(),
	);
	match &tree {
		TreeNode::Multiway(node) => {
			assert_eq!(node.attribute, "outlook");
			assert_eq!(node.branches.len(), 3);
			assert!(node.gain > 0.0);
			assert!(node.branches.iter().all(|branch| branch.child.is_leaf()));
		}
		_ => panic!("expected a multiway split"),
	}
	for row in rows.iter() {
		let prediction = crate::predict::predict(&tree, row);
		assert_eq!(prediction, value_of(row, "play"));
	}
}

#[test]
fn test_pure_labels_yield_a_leaf() {
	let mut rows = weather_rows();
	for row in rows.iter_mut() {
		row.insert("play".to_owned(), Value::from("yes"));
	}
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["outlook".to_owned()];
	let tree = build(
		&rows,
		&indices,
		"play",
		&attributes,
		0,
		&TreeOptions::default(),
	);
	assert_eq!(
		tree,
		TreeNode::Leaf(LeafNode {
			value: Value::from("yes"),
			samples: 4,
		})
	);
}

#[test]
fn test_depth_limit_yields_majority_leaf() {
	let rows = weather_rows();
	let indices: Vec<usize> = (0..rows.len()).collect();
	let attributes = vec!["outlook".to_owned()];
	let options = TreeOptions {
		max_depth: 0,
		..TreeOptions::default()
	};
	let tree = build(&rows, &indices, "play", &attributes, 0, &options);
	match tree {
		TreeNode::Leaf(leaf) => {
			// "no" and "yes" are tied two-two, so the first-encountered label wins.
			assert_eq!(leaf.value, Value::from("no"));
			assert_eq!(leaf.samples, 4);
		}
		_ => panic!("expected a leaf"),
	}
}

#[test]
fn test_empty_rows_build_a_degenerate_leaf() {
	let rows: Vec<Row> = Vec::new();
	let tree = build(&rows, &[], "play", &[], 0, &TreeOptions::default());
	assert_eq!(
		tree,
		TreeNode::Leaf(LeafNode {
			value: Value::Unknown,
			samples: 0,
		})
	);
}
