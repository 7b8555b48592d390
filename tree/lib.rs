/*!
This crate implements decision tree induction and prediction: a discrete multiway builder, a continuous/mixed builder with binary threshold splits, a gradient/hessian-weighted builder for boosting, and a predictor that traverses a built tree for one sample. Trees are immutable once built; retraining a model discards the previous tree entirely.
*/

pub mod cart;
pub mod criteria;
pub mod id3;
mod node;
mod partition;
pub mod predict;
pub mod weighted;

pub use criteria::Criterion;
pub use node::{BinaryNode, LeafNode, MultiwayBranch, MultiwayNode, TreeNode};
pub use predict::{NoopMemo, PredictionMemo};

use arbor_data::{is_continuous, FeatureTypes, Row, Value};
use thiserror::Error;

/// Which induction algorithm to use. `Auto` picks the continuous/mixed builder when any attribute is marked continuous and the discrete builder otherwise.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Algorithm {
	#[serde(rename = "id3")]
	Id3,
	#[serde(rename = "cart")]
	Cart,
	#[serde(rename = "auto")]
	Auto,
}

/// The options controlling tree induction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeOptions {
	pub algorithm: Algorithm,
	/// The impurity criterion used by the continuous/mixed builder. The discrete builder always uses entropy.
	pub criterion: Criterion,
	/// The depth of a tree will never exceed this value.
	pub max_depth: usize,
	/// A node with fewer rows than this becomes a leaf instead of being split.
	pub min_samples_split: usize,
	/// A candidate split is rejected if it would produce a child with fewer rows than this.
	pub min_samples_leaf: usize,
}

impl Default for TreeOptions {
	fn default() -> Self {
		Self {
			algorithm: Algorithm::Auto,
			criterion: Criterion::Gini,
			max_depth: 20,
			min_samples_split: 2,
			min_samples_leaf: 1,
		}
	}
}

impl TreeOptions {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_depth == 0 {
			return Err(ConfigError::InvalidOption {
				option: "maxDepth",
				reason: "must be at least 1",
			});
		}
		if self.min_samples_split == 0 {
			return Err(ConfigError::InvalidOption {
				option: "minSamplesSplit",
				reason: "must be at least 1",
			});
		}
		if self.min_samples_leaf == 0 {
			return Err(ConfigError::InvalidOption {
				option: "minSamplesLeaf",
				reason: "must be at least 1",
			});
		}
		Ok(())
	}
}

/// An invalid construction argument. Raised immediately and fatal to that construction.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid value for `{option}`: {reason}")]
	InvalidOption {
		option: &'static str,
		reason: &'static str,
	},
}

/// An error raised from `train`. The model is left in its pre-training state.
#[derive(Debug, Error)]
pub enum TrainError {
	#[error("training data is empty")]
	EmptyTrainingData,
	#[error("target column `{0}` has values that do not coerce to numbers")]
	NonNumericTarget(String),
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// An error raised from `predict` or `feature_importances`.
#[derive(Debug, Error)]
pub enum PredictError {
	#[error("the model has not been trained")]
	NotTrained,
	#[error("the ensemble contains no trees")]
	EmptyEnsemble,
}

/// Build one tree over the rows selected by `indices`, dispatching on the configured algorithm.
pub fn build_tree(
	rows: &[Row],
	indices: &[usize],
	target: &str,
	attributes: &[String],
	feature_types: &FeatureTypes,
	options: &TreeOptions,
) -> Result<TreeNode, TrainError> {
	let algorithm = match options.algorithm {
		Algorithm::Auto => {
			if attributes
				.iter()
				.any(|attribute| is_continuous(feature_types, attribute))
			{
				Algorithm::Cart
			} else {
				Algorithm::Id3
			}
		}
		algorithm => algorithm,
	};
	match algorithm {
		Algorithm::Id3 => Ok(id3::build(rows, indices, target, attributes, 0, options)),
		Algorithm::Cart => cart::build(rows, indices, target, attributes, feature_types, 0, options),
		Algorithm::Auto => unreachable!(),
	}
}

/// A single decision tree model: the built tree plus the attribute list, target name, feature types, and options used to train it. This struct is also the serialized model record, so serializing and re-hydrating it reproduces bit-identical predictions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTree {
	#[serde(rename = "config")]
	pub options: TreeOptions,
	pub tree: Option<TreeNode>,
	pub target_name: Option<String>,
	#[serde(default)]
	pub attributes: Vec<String>,
	#[serde(default)]
	pub feature_types: FeatureTypes,
}

impl DecisionTree {
	/// Create an untrained model from options, validating them first.
	pub fn from_config(options: TreeOptions) -> Result<Self, ConfigError> {
		options.validate()?;
		Ok(Self {
			options,
			tree: None,
			target_name: None,
			attributes: Vec::new(),
			feature_types: FeatureTypes::new(),
		})
	}

	/// Re-hydrate a model from its serialized record.
	pub fn from_serialized(serialized: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(serialized)
	}

	/// Create and train a model in one call.
	pub fn train_new(
		rows: &[Row],
		target: &str,
		attributes: &[String],
		feature_types: &FeatureTypes,
		options: TreeOptions,
	) -> Result<Self, TrainError> {
		let mut model = Self::from_config(options)?;
		model.train(rows, target, attributes, feature_types)?;
		Ok(model)
	}

	pub fn to_serialized(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// Train the model, discarding any previously built tree.
	pub fn train(
		&mut self,
		rows: &[Row],
		target: &str,
		attributes: &[String],
		feature_types: &FeatureTypes,
	) -> Result<(), TrainError> {
		let indices: Vec<usize> = (0..rows.len()).collect();
		let tree = build_tree(rows, &indices, target, attributes, feature_types, &self.options)?;
		self.tree = Some(tree);
		self.target_name = Some(target.to_owned());
		self.attributes = attributes.to_vec();
		self.feature_types = feature_types.clone();
		Ok(())
	}

	pub fn predict(&self, sample: &Row) -> Result<Value, PredictError> {
		let tree = self.tree.as_ref().ok_or(PredictError::NotTrained)?;
		Ok(predict::predict(tree, sample).clone())
	}

	/// Predict through a memoizer. `model_key` identifies this model in the cache; the caller supplies it because the cache is shared across models.
	pub fn predict_with_memo(
		&self,
		model_key: &str,
		sample: &Row,
		memo: &mut dyn PredictionMemo,
	) -> Result<Value, PredictError> {
		let sample_key = serde_json::to_string(sample).unwrap_or_default();
		let key = format!("{}:{}", model_key, sample_key);
		if let Some(value) = memo.get(&key) {
			return Ok(value);
		}
		let value = self.predict(sample)?;
		memo.put(key, value.clone());
		Ok(value)
	}
}

#[cfg(test)]
use maplit::btreemap;

#[test]
fn test_from_config_rejects_invalid_options() {
	let options = TreeOptions {
		max_depth: 0,
		..TreeOptions::default()
	};
	assert!(DecisionTree::from_config(options).is_err());
}

#[test]
fn test_predict_before_train_is_an_error() {
	let model = DecisionTree::from_config(TreeOptions::default()).unwrap();
	let sample = btreemap! { "x".to_owned() => Value::from(1.0) };
	assert!(matches!(
		model.predict(&sample),
		Err(PredictError::NotTrained)
	));
}

#[test]
fn test_serialized_round_trip_predicts_identically() {
	let rows: Vec<Row> = (1..=6)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(if x <= 3 { "lo" } else { "hi" }),
			}
		})
		.collect();
	let feature_types = btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous };
	let attributes = vec!["x".to_owned()];
	let model = DecisionTree::train_new(
		&rows,
		"y",
		&attributes,
		&feature_types,
		TreeOptions::default(),
	)
	.unwrap();
	let serialized = model.to_serialized().unwrap();
	let rehydrated = DecisionTree::from_serialized(&serialized).unwrap();
	for row in rows.iter() {
		assert_eq!(model.predict(row).unwrap(), rehydrated.predict(row).unwrap());
	}
}

#[test]
fn test_retraining_discards_the_previous_tree() {
	let rows: Vec<Row> = vec![
		btreemap! {
			"a".to_owned() => Value::from("x"),
			"y".to_owned() => Value::from("one"),
		},
		btreemap! {
			"a".to_owned() => Value::from("z"),
			"y".to_owned() => Value::from("two"),
		},
	];
	let attributes = vec!["a".to_owned()];
	let mut model = DecisionTree::from_config(TreeOptions::default()).unwrap();
	model
		.train(&rows, "y", &attributes, &FeatureTypes::new())
		.unwrap();
	let first = model.tree.clone();
	let flipped: Vec<Row> = vec![rows[1].clone(), rows[0].clone()];
	model
		.train(&flipped, "y", &attributes, &FeatureTypes::new())
		.unwrap();
	assert_ne!(model.tree, first);
}

#[test]
fn test_predict_with_memo_uses_cached_values() {
	struct MapMemo(std::collections::BTreeMap<String, Value>);
	impl PredictionMemo for MapMemo {
		fn get(&self, key: &str) -> Option<Value> {
			self.0.get(key).cloned()
		}
		fn put(&mut self, key: String, value: Value) {
			self.0.insert(key, value);
		}
	}
	let rows: Vec<Row> = vec![
		btreemap! {
			"a".to_owned() => Value::from("x"),
			"y".to_owned() => Value::from("one"),
		},
		btreemap! {
			"a".to_owned() => Value::from("z"),
			"y".to_owned() => Value::from("two"),
		},
	];
	let attributes = vec!["a".to_owned()];
	let model = DecisionTree::train_new(
		&rows,
		"y",
		&attributes,
		&FeatureTypes::new(),
		TreeOptions::default(),
	)
	.unwrap();
	let mut memo = MapMemo(std::collections::BTreeMap::new());
	let sample = &rows[0];
	let first = model.predict_with_memo("m1", sample, &mut memo).unwrap();
	assert_eq!(first, Value::from("one"));
	assert_eq!(memo.0.len(), 1);
	// A second call is served from the memo.
	let second = model.predict_with_memo("m1", sample, &mut memo).unwrap();
	assert_eq!(second, first);
	// The no-op memoizer is a valid substitute.
	let mut noop = NoopMemo;
	let third = model.predict_with_memo("m1", sample, &mut noop).unwrap();
	assert_eq!(third, first);
}
