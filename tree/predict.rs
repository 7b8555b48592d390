/*!
Tree traversal for a single sample, plus the injectable prediction memoizer interface. Traversal always terminates because tree depth is finite by construction.
*/

use crate::node::TreeNode;
use arbor_data::{value_of, Row, Value};

/// Traverse `tree` with `sample` and return the value of the leaf it reaches.
///
/// Multiway splits look the sample's value up among the branch keys by exact match; an unseen value falls back to the first branch in stored order. Binary splits coerce the sample's value to a number and compare it with the threshold; a value that does not coerce goes to the first (left) child.
pub fn predict<'a>(tree: &'a TreeNode, sample: &Row) -> &'a Value {
	let mut node = tree;
	loop {
		match node {
			TreeNode::Leaf(leaf) => return &leaf.value,
			TreeNode::Multiway(split) => {
				let value = value_of(sample, &split.attribute);
				let branch = split
					.branches
					.iter()
					.find(|branch| &branch.value == value)
					.unwrap_or_else(|| &split.branches[0]);
				node = &branch.child;
			}
			TreeNode::Binary(split) => {
				node = match value_of(sample, &split.attribute).as_number() {
					Some(value) if value > split.threshold => &split.right,
					_ => &split.left,
				};
			}
		}
	}
}

/// A cache of predictions keyed by sample and model identity. Training and prediction take this as an explicit argument rather than consulting shared state, so a no-op implementation is always a valid substitute.
pub trait PredictionMemo {
	fn get(&self, key: &str) -> Option<Value>;
	fn put(&mut self, key: String, value: Value);
}

/// The no-op memoizer: never remembers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMemo;

impl PredictionMemo for NoopMemo {
	fn get(&self, _key: &str) -> Option<Value> {
		None
	}

	fn put(&mut self, _key: String, _value: Value) {}
}

#[cfg(test)]
use crate::node::{BinaryNode, LeafNode, MultiwayBranch, MultiwayNode};
#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn leaf(value: Value) -> TreeNode {
	TreeNode::Leaf(LeafNode { value, samples: 1 })
}

#[test]
fn test_multiway_prediction_falls_back_to_first_branch() {
	let tree = TreeNode::Multiway(MultiwayNode {
		attribute: "color".to_owned(),
		gain: 1.0,
		samples: 2,
		branches: vec![
			MultiwayBranch {
				value: Value::from("red"),
				samples: 1,
				fraction: 0.5,
				child: leaf(Value::from("warm")),
			},
			MultiwayBranch {
				value: Value::from("blue"),
				samples: 1,
				fraction: 0.5,
				child: leaf(Value::from("cool")),
			},
		],
	});
	let sample = btreemap! { "color".to_owned() => Value::from("blue") };
	assert_eq!(predict(&tree, &sample), &Value::from("cool"));
	// An unseen category descends into the first branch.
	let sample = btreemap! { "color".to_owned() => Value::from("green") };
	assert_eq!(predict(&tree, &sample), &Value::from("warm"));
	// A missing attribute behaves like an unseen value too.
	let sample = btreemap! {};
	assert_eq!(predict(&tree, &sample), &Value::from("warm"));
}

#[test]
fn test_binary_prediction_coerces_and_falls_back_left() {
	let tree = TreeNode::Binary(BinaryNode {
		attribute: "x".to_owned(),
		gain: 1.0,
		samples: 2,
		threshold: 3.5,
		left: Box::new(leaf(Value::from("lo"))),
		right: Box::new(leaf(Value::from("hi"))),
	});
	let sample = btreemap! { "x".to_owned() => Value::from(2.0) };
	assert_eq!(predict(&tree, &sample), &Value::from("lo"));
	let sample = btreemap! { "x".to_owned() => Value::from(4.0) };
	assert_eq!(predict(&tree, &sample), &Value::from("hi"));
	// Text coerces when it parses as a number.
	let sample = btreemap! { "x".to_owned() => Value::from("5") };
	assert_eq!(predict(&tree, &sample), &Value::from("hi"));
	// Anything else descends into the left child.
	let sample = btreemap! { "x".to_owned() => Value::from("many") };
	assert_eq!(predict(&tree, &sample), &Value::from("lo"));
}
