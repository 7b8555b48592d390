/*!
The random forest aggregator. Training drives the sampler and a tree builder once per estimator; prediction runs every tree and combines the results by majority vote.
*/

use crate::{
	progress::{ProgressCounter, TrainProgress},
	sampler::{bootstrap_sample, select_random_features, Lcg, MaxFeatures},
};
use arbor_data::{FeatureTypes, Row, Value};
use arbor_tree::{
	build_tree, predict::predict, ConfigError, PredictError, TrainError, TreeNode, TreeOptions,
};
use num_traits::ToPrimitive;
use std::collections::BTreeMap;

/// The options controlling forest training.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForestOptions {
	/// The number of trees to train. Zero yields an ensemble of zero trees, which is not an error until prediction time.
	pub n_estimators: usize,
	/// If true, each tree trains on a bootstrap resample of the rows; otherwise every tree sees the rows verbatim.
	pub bootstrap: bool,
	pub max_features: MaxFeatures,
	/// The seed for the sampler's pseudo-random generator.
	pub random_state: u64,
	#[serde(flatten)]
	pub tree: TreeOptions,
}

impl Default for ForestOptions {
	fn default() -> Self {
		Self {
			n_estimators: 10,
			bootstrap: true,
			max_features: MaxFeatures::default(),
			random_state: 42,
			tree: TreeOptions::default(),
		}
	}
}

impl ForestOptions {
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.tree.validate()
	}
}

/// A trained random forest: the trees, the per-tree attribute subsets, and the training metadata. The struct doubles as the serialized ensemble record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomForest {
	#[serde(rename = "config")]
	pub options: ForestOptions,
	pub trees: Vec<TreeNode>,
	/// The attribute subset each tree was trained on.
	pub tree_attributes: Vec<Vec<String>>,
	pub target_name: Option<String>,
	#[serde(default)]
	pub attributes: Vec<String>,
	#[serde(default)]
	pub feature_types: FeatureTypes,
}

impl RandomForest {
	pub fn from_config(options: ForestOptions) -> Result<Self, ConfigError> {
		options.validate()?;
		Ok(Self {
			options,
			trees: Vec::new(),
			tree_attributes: Vec::new(),
			target_name: None,
			attributes: Vec::new(),
			feature_types: FeatureTypes::new(),
		})
	}

	pub fn from_serialized(serialized: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(serialized)
	}

	pub fn train_new(
		rows: &[Row],
		target: &str,
		attributes: &[String],
		feature_types: &FeatureTypes,
		options: ForestOptions,
	) -> Result<Self, TrainError> {
		let mut model = Self::from_config(options)?;
		model.train(rows, target, attributes, feature_types)?;
		Ok(model)
	}

	pub fn to_serialized(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	pub fn train(
		&mut self,
		rows: &[Row],
		target: &str,
		attributes: &[String],
		feature_types: &FeatureTypes,
	) -> Result<(), TrainError> {
		self.train_with_progress(rows, target, attributes, feature_types, &mut |_| {})
	}

	/// Train the forest, discarding any previously trained ensemble. Each estimator draws a bootstrap sample and a feature subset from the seeded sampler, so training is reproducible for a given seed.
	pub fn train_with_progress(
		&mut self,
		rows: &[Row],
		target: &str,
		attributes: &[String],
		feature_types: &FeatureTypes,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<(), TrainError> {
		if rows.is_empty() {
			return Err(TrainError::EmptyTrainingData);
		}
		let mut rng = Lcg::new(self.options.random_state);
		let mut trees = Vec::with_capacity(self.options.n_estimators);
		let mut tree_attributes = Vec::with_capacity(self.options.n_estimators);
		let counter = ProgressCounter::new(self.options.n_estimators.to_u64().unwrap());
		update_progress(TrainProgress::BuildingTrees(counter.clone()));
		for _ in 0..self.options.n_estimators {
			let indices = if self.options.bootstrap {
				bootstrap_sample(rows.len(), rows.len(), &mut rng)?
			} else {
				(0..rows.len()).collect()
			};
			let features =
				select_random_features(attributes, self.options.max_features, &mut rng);
			let tree = build_tree(
				rows,
				&indices,
				target,
				&features,
				feature_types,
				&self.options.tree,
			)?;
			trees.push(tree);
			tree_attributes.push(features);
			counter.inc(1);
		}
		self.trees = trees;
		self.tree_attributes = tree_attributes;
		self.target_name = Some(target.to_owned());
		self.attributes = attributes.to_vec();
		self.feature_types = feature_types.clone();
		Ok(())
	}

	/// Predict by majority vote over every tree's prediction. Numbers and booleans are compared by value and everything else by textual representation; ties go to the first-encountered group.
	pub fn predict(&self, sample: &Row) -> Result<Value, PredictError> {
		if self.target_name.is_none() {
			return Err(PredictError::NotTrained);
		}
		if self.trees.is_empty() {
			return Err(PredictError::EmptyEnsemble);
		}
		let mut groups: Vec<(VoteKey, &Value, usize)> = Vec::new();
		for tree in self.trees.iter() {
			let prediction = predict(tree, sample);
			let key = VoteKey::new(prediction);
			match groups.iter_mut().find(|(k, _, _)| *k == key) {
				Some(group) => group.2 += 1,
				None => groups.push((key, prediction, 1)),
			}
		}
		let mut winner: Option<(&Value, usize)> = None;
		for (_, value, count) in groups.iter() {
			if winner.map_or(true, |(_, best)| *count > best) {
				winner = Some((value, *count));
			}
		}
		// The ensemble is non-empty, so there is always at least one group.
		Ok(winner.map(|(value, _)| value.clone()).unwrap())
	}

	/// Sum `gain × samples` over every split node of every tree, keyed by attribute, then divide by the number of trees. Branches of a grouped discrete split share a subtree; the shared child is visited once.
	pub fn feature_importances(&self) -> Result<BTreeMap<String, f64>, PredictError> {
		if self.target_name.is_none() {
			return Err(PredictError::NotTrained);
		}
		if self.trees.is_empty() {
			return Err(PredictError::EmptyEnsemble);
		}
		let mut totals = BTreeMap::new();
		for tree in self.trees.iter() {
			accumulate_importances(tree, &mut totals);
		}
		let n_trees = self.trees.len().to_f64().unwrap();
		for total in totals.values_mut() {
			*total /= n_trees;
		}
		Ok(totals)
	}
}

fn accumulate_importances(node: &TreeNode, totals: &mut BTreeMap<String, f64>) {
	match node {
		TreeNode::Leaf(_) => {}
		TreeNode::Binary(split) => {
			*totals.entry(split.attribute.clone()).or_insert(0.0) +=
				split.gain * split.samples.to_f64().unwrap();
			accumulate_importances(&split.left, totals);
			accumulate_importances(&split.right, totals);
		}
		TreeNode::Multiway(split) => {
			*totals.entry(split.attribute.clone()).or_insert(0.0) +=
				split.gain * split.samples.to_f64().unwrap();
			let mut visited: Vec<&TreeNode> = Vec::new();
			for branch in split.branches.iter() {
				if visited.iter().any(|&child| child == &branch.child) {
					continue;
				}
				visited.push(&branch.child);
				accumulate_importances(&branch.child, totals);
			}
		}
	}
}

/// The grouping key for majority voting.
#[derive(Debug, PartialEq)]
enum VoteKey {
	Number(u64),
	Bool(bool),
	Text(String),
}

impl VoteKey {
	fn new(value: &Value) -> Self {
		match value {
			// Adding 0.0 collapses -0.0 into 0.0 so the two count as one vote group.
			Value::Number(number) => VoteKey::Number((number + 0.0).to_bits()),
			Value::Bool(boolean) => VoteKey::Bool(*boolean),
			_ => VoteKey::Text(value.to_string()),
		}
	}
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn labeled_rows() -> Vec<Row> {
	(0..20)
		.map(|i| {
			btreemap! {
				"x".to_owned() => Value::from(i as f64),
				"parity".to_owned() => Value::from(if i % 2 == 0 { "even" } else { "odd" }),
				"y".to_owned() => Value::from(if i < 10 { "lo" } else { "hi" }),
			}
		})
		.collect()
}

#[cfg(test)]
fn labeled_feature_types() -> FeatureTypes {
	btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous }
}

#[test]
fn test_forest_fits_separable_data() {
	let rows = labeled_rows();
	let attributes = vec!["x".to_owned(), "parity".to_owned()];
	let options = ForestOptions {
		n_estimators: 10,
		max_features: MaxFeatures::Count(2),
		..ForestOptions::default()
	};
	let forest = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		options,
	)
	.unwrap();
	assert_eq!(forest.trees.len(), 10);
	assert_eq!(forest.tree_attributes.len(), 10);
	let sample = btreemap! {
		"x".to_owned() => Value::from(2.0),
		"parity".to_owned() => Value::from("even"),
	};
	assert_eq!(forest.predict(&sample).unwrap(), Value::from("lo"));
	let sample = btreemap! {
		"x".to_owned() => Value::from(17.0),
		"parity".to_owned() => Value::from("odd"),
	};
	assert_eq!(forest.predict(&sample).unwrap(), Value::from("hi"));
}

#[test]
fn test_same_seed_trains_identical_forests() {
	let rows = labeled_rows();
	let attributes = vec!["x".to_owned(), "parity".to_owned()];
	let options = ForestOptions {
		n_estimators: 5,
		..ForestOptions::default()
	};
	let left = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		options.clone(),
	)
	.unwrap();
	let right = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		options,
	)
	.unwrap();
	assert_eq!(left.trees, right.trees);
	assert_eq!(left.tree_attributes, right.tree_attributes);
}

#[test]
fn test_zero_estimators_trains_but_cannot_predict() {
	let rows = labeled_rows();
	let attributes = vec!["x".to_owned()];
	let options = ForestOptions {
		n_estimators: 0,
		..ForestOptions::default()
	};
	let forest = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		options,
	)
	.unwrap();
	assert!(forest.trees.is_empty());
	let sample = btreemap! { "x".to_owned() => Value::from(1.0) };
	assert!(matches!(
		forest.predict(&sample),
		Err(PredictError::EmptyEnsemble)
	));
	assert!(matches!(
		forest.feature_importances(),
		Err(PredictError::EmptyEnsemble)
	));
}

#[test]
fn test_untrained_forest_raises_on_predict_and_importances() {
	let forest = RandomForest::from_config(ForestOptions::default()).unwrap();
	let sample = btreemap! { "x".to_owned() => Value::from(1.0) };
	assert!(matches!(
		forest.predict(&sample),
		Err(PredictError::NotTrained)
	));
	assert!(matches!(
		forest.feature_importances(),
		Err(PredictError::NotTrained)
	));
}

#[test]
fn test_empty_training_data_is_an_error() {
	let mut forest = RandomForest::from_config(ForestOptions::default()).unwrap();
	let result = forest.train(&[], "y", &["x".to_owned()], &FeatureTypes::new());
	assert!(matches!(result, Err(TrainError::EmptyTrainingData)));
}

#[test]
fn test_feature_importances_track_useful_attributes() {
	let rows = labeled_rows();
	let attributes = vec!["x".to_owned(), "parity".to_owned()];
	let options = ForestOptions {
		n_estimators: 10,
		max_features: MaxFeatures::Count(2),
		..ForestOptions::default()
	};
	let forest = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		options,
	)
	.unwrap();
	let importances = forest.feature_importances().unwrap();
	// `x` separates the target perfectly; `parity` carries no signal.
	let x_importance = importances.get("x").copied().unwrap_or(0.0);
	let parity_importance = importances.get("parity").copied().unwrap_or(0.0);
	assert!(x_importance > 0.0);
	assert!(x_importance > parity_importance);
}

#[test]
fn test_vote_keys_compare_numbers_by_value() {
	assert_eq!(
		VoteKey::new(&Value::Number(0.0)),
		VoteKey::new(&Value::Number(-0.0))
	);
	assert_ne!(
		VoteKey::new(&Value::Number(0.0)),
		VoteKey::new(&Value::Number(1.0))
	);
	assert_ne!(
		VoteKey::new(&Value::Bool(false)),
		VoteKey::new(&Value::Number(0.0))
	);
}

#[test]
fn test_serialized_round_trip_predicts_identically() {
	let rows = labeled_rows();
	let attributes = vec!["x".to_owned(), "parity".to_owned()];
	let forest = RandomForest::train_new(
		&rows,
		"y",
		&attributes,
		&labeled_feature_types(),
		ForestOptions::default(),
	)
	.unwrap();
	let serialized = forest.to_serialized().unwrap();
	let rehydrated = RandomForest::from_serialized(&serialized).unwrap();
	for row in rows.iter() {
		assert_eq!(
			forest.predict(row).unwrap(),
			rehydrated.predict(row).unwrap()
		);
	}
}
