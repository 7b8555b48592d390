/*!
This module defines the tree structure produced by the builders. A node is a tagged variant with three kinds, so that invalid shapes, like a leaf with children or a binary split without a threshold, are unrepresentable.
*/

use arbor_data::Value;

/// A node in a trained tree. Trees are immutable once built: builders return a `TreeNode` and predictors only read it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum TreeNode {
	#[serde(rename = "leaf")]
	Leaf(LeafNode),
	#[serde(rename = "multiway")]
	Multiway(MultiwayNode),
	#[serde(rename = "binary")]
	Binary(BinaryNode),
}

/// A terminal node holding the value to output for samples that reach it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LeafNode {
	/// The prediction value: a class label, a numeric mean, or a regularized weight for boosting trees.
	pub value: Value,
	/// The number of training rows that reached this leaf.
	pub samples: usize,
}

/// A split over a discrete attribute with one branch per distinct value observed at this node during training. Branches are ordered by first observation, which makes the unseen-value fallback at prediction time deterministic.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MultiwayNode {
	pub attribute: String,
	/// The impurity reduction achieved by this split.
	pub gain: f64,
	/// The number of training rows that reached this node.
	pub samples: usize,
	pub branches: Vec<MultiwayBranch>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MultiwayBranch {
	/// The attribute value this branch matches.
	pub value: Value,
	/// The number of training rows that went down this branch.
	pub samples: usize,
	/// This branch's share of its parent's rows.
	pub fraction: f64,
	pub child: TreeNode,
}

/// A binary threshold split over a continuous attribute. Samples with a value less than or equal to the threshold go left, the rest go right.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BinaryNode {
	pub attribute: String,
	/// The impurity reduction achieved by this split.
	pub gain: f64,
	/// The number of training rows that reached this node.
	pub samples: usize,
	pub threshold: f64,
	pub left: Box<TreeNode>,
	pub right: Box<TreeNode>,
}

impl TreeNode {
	pub fn samples(&self) -> usize {
		match self {
			TreeNode::Leaf(node) => node.samples,
			TreeNode::Multiway(node) => node.samples,
			TreeNode::Binary(node) => node.samples,
		}
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self, TreeNode::Leaf(_))
	}
}
