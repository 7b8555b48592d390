/*!
The gradient boosting engine. Training fits an additive model: each round computes per-row gradients and hessians of the objective at the current predictions, builds one weighted tree over a (possibly subsampled) view of the rows and attributes, and adds the tree's output scaled by the learning rate to every prediction. A held-out validation split drives early stopping.
*/

use crate::{
	early_stopping::EarlyStoppingMonitor,
	loss::{sigmoid, Objective, EPS},
	progress::{ProgressCounter, TrainProgress},
	sampler::{shuffle, Lcg},
};
use arbor_data::{value_of, FeatureTypes, Row, Value};
use arbor_tree::{
	predict::predict,
	weighted::{self, WeightedTreeOptions},
	ConfigError, PredictError, TrainError, TreeNode,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// The options controlling boosting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoostOptions {
	/// The maximum number of boosting rounds. Early stopping may train fewer trees.
	pub n_estimators: usize,
	pub learning_rate: f64,
	pub objective: Objective,
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
	/// The minimum sum of hessians each child of a split must carry.
	pub min_child_weight: f64,
	/// Accepted for configuration compatibility. Leaf values apply only the L2 term.
	pub reg_alpha: f64,
	/// The L2 regularization term applied to leaf weights and split scores.
	pub reg_lambda: f64,
	/// The fraction of training rows each tree sees, sampled without replacement.
	pub subsample: f64,
	/// The fraction of attributes each tree sees.
	pub colsample_by_tree: f64,
	/// The fraction of rows held out for validation. Zero disables the validation split.
	pub validation_fraction: f64,
	/// Stop after this many consecutive rounds without validation loss improvement. `None` disables early stopping.
	pub early_stopping_rounds: Option<usize>,
	/// The seed for the sampler's pseudo-random generator.
	pub random_state: u64,
}

impl Default for BoostOptions {
	fn default() -> Self {
		Self {
			n_estimators: 100,
			learning_rate: 0.1,
			objective: Objective::Regression,
			max_depth: 3,
			min_samples_split: 2,
			min_samples_leaf: 1,
			min_child_weight: 1.0,
			reg_alpha: 0.0,
			reg_lambda: 1.0,
			subsample: 1.0,
			colsample_by_tree: 1.0,
			validation_fraction: 0.2,
			early_stopping_rounds: Some(10),
			random_state: 42,
		}
	}
}

impl BoostOptions {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(self.learning_rate > 0.0) {
			return Err(ConfigError::InvalidOption {
				option: "learningRate",
				reason: "must be greater than 0",
			});
		}
		if self.max_depth == 0 {
			return Err(ConfigError::InvalidOption {
				option: "maxDepth",
				reason: "must be at least 1",
			});
		}
		if !(self.subsample > 0.0 && self.subsample <= 1.0) {
			return Err(ConfigError::InvalidOption {
				option: "subsample",
				reason: "must be in (0, 1]",
			});
		}
		if !(self.colsample_by_tree > 0.0 && self.colsample_by_tree <= 1.0) {
			return Err(ConfigError::InvalidOption {
				option: "colsampleByTree",
				reason: "must be in (0, 1]",
			});
		}
		if self.reg_alpha < 0.0 || self.reg_lambda < 0.0 {
			return Err(ConfigError::InvalidOption {
				option: "regLambda",
				reason: "regularization terms must not be negative",
			});
		}
		if !(self.validation_fraction >= 0.0 && self.validation_fraction < 1.0) {
			return Err(ConfigError::InvalidOption {
				option: "validationFraction",
				reason: "must be in [0, 1)",
			});
		}
		Ok(())
	}

	fn weighted_tree_options(&self) -> WeightedTreeOptions {
		WeightedTreeOptions {
			max_depth: self.max_depth,
			min_samples_split: self.min_samples_split,
			min_samples_leaf: self.min_samples_leaf,
			min_child_weight: self.min_child_weight,
			reg_lambda: self.reg_lambda,
		}
	}
}

/// The per-round losses recorded during training.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostingHistory {
	pub train_loss: Vec<f64>,
	/// Empty when training ran without a validation split.
	pub validation_loss: Vec<f64>,
	/// The one-based round numbers actually trained, parallel to `train_loss`.
	pub iterations: Vec<usize>,
}

/// A trained gradient boosting model: the trees, the base score they correct, and the training metadata. The struct doubles as the serialized ensemble record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientBoosting {
	#[serde(rename = "config")]
	pub options: BoostOptions,
	pub trees: Vec<TreeNode>,
	/// The attribute subset each tree was trained on.
	pub tree_attributes: Vec<Vec<String>>,
	/// The constant initial prediction every tree corrects.
	pub base_score: f64,
	/// Predictions sum the first `best_iteration` trees. Equal to the number of trees when training ran without early stopping.
	pub best_iteration: usize,
	pub boosting_history: Option<BoostingHistory>,
	pub target_name: Option<String>,
	#[serde(default)]
	pub attributes: Vec<String>,
	#[serde(default)]
	pub feature_types: FeatureTypes,
}

impl GradientBoosting {
	pub fn from_config(options: BoostOptions) -> Result<Self, ConfigError> {
		options.validate()?;
		Ok(Self {
			options,
			trees: Vec::new(),
			tree_attributes: Vec::new(),
			base_score: 0.0,
			best_iteration: 0,
			boosting_history: None,
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
		options: BoostOptions,
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
		let targets = numeric_targets(rows, target)?;
		let mut rng = Lcg::new(self.options.random_state);
		// Split off the validation rows by shuffling the row indices once. The split only happens when early stopping can consume it.
		let n = rows.len();
		let n_valid = if self.options.early_stopping_rounds.is_some() {
			(self.options.validation_fraction * n.to_f64().unwrap())
				.floor()
				.to_usize()
				.unwrap()
		} else {
			0
		};
		let mut shuffled: Vec<usize> = (0..n).collect();
		shuffle(&mut shuffled, &mut rng);
		let (valid_indices, train_indices) = if n_valid == 0 || n_valid >= n {
			(&shuffled[0..0], &shuffled[..])
		} else {
			shuffled.split_at(n_valid)
		};
		let train_rows: Vec<Row> = train_indices.iter().map(|&i| rows[i].clone()).collect();
		let valid_rows: Vec<Row> = valid_indices.iter().map(|&i| rows[i].clone()).collect();
		let train_targets: Array1<f64> =
			train_indices.iter().map(|&i| targets[i]).collect();
		let valid_targets: Array1<f64> =
			valid_indices.iter().map(|&i| targets[i]).collect();
		let base_score = base_score(self.options.objective, train_targets.view());
		let mut train_predictions = Array1::from_elem(train_rows.len(), base_score);
		let mut valid_predictions = Array1::from_elem(valid_rows.len(), base_score);
		let mut gradients = Array1::zeros(train_rows.len());
		let mut hessians = Array1::zeros(train_rows.len());
		let weighted_options = self.options.weighted_tree_options();
		let mut trees = Vec::with_capacity(self.options.n_estimators);
		let mut tree_attributes = Vec::with_capacity(self.options.n_estimators);
		let mut train_loss = Vec::with_capacity(self.options.n_estimators);
		let mut validation_loss = Vec::with_capacity(self.options.n_estimators);
		let mut iterations = Vec::with_capacity(self.options.n_estimators);
		let has_validation = !valid_rows.is_empty();
		let mut monitor =
			EarlyStoppingMonitor::new(self.options.early_stopping_rounds.unwrap_or(usize::MAX));
		let counter = ProgressCounter::new(self.options.n_estimators.to_u64().unwrap());
		update_progress(TrainProgress::Boosting(counter.clone()));
		for round_index in 0..self.options.n_estimators {
			self.options.objective.gradients_and_hessians(
				train_predictions.view(),
				train_targets.view(),
				&mut gradients,
				&mut hessians,
			);
			let sampled = sample_fraction(train_rows.len(), self.options.subsample, &mut rng);
			let features = sample_attributes(attributes, self.options.colsample_by_tree, &mut rng);
			let tree = weighted::build(
				&train_rows,
				&sampled,
				&features,
				feature_types,
				gradients.as_slice().unwrap(),
				hessians.as_slice().unwrap(),
				0,
				&weighted_options,
			);
			for (prediction, row) in train_predictions.iter_mut().zip(train_rows.iter()) {
				*prediction += self.options.learning_rate * tree_output(&tree, row);
			}
			for (prediction, row) in valid_predictions.iter_mut().zip(valid_rows.iter()) {
				*prediction += self.options.learning_rate * tree_output(&tree, row);
			}
			trees.push(tree);
			tree_attributes.push(features);
			iterations.push(round_index + 1);
			train_loss.push(
				self.options
					.objective
					.loss(train_predictions.view(), train_targets.view()),
			);
			counter.inc(1);
			if has_validation {
				let loss = self
					.options
					.objective
					.loss(valid_predictions.view(), valid_targets.view());
				validation_loss.push(loss);
				let should_stop = monitor.update(round_index, loss);
				if self.options.early_stopping_rounds.is_some() && should_stop {
					break;
				}
			}
		}
		self.best_iteration = if has_validation && self.options.early_stopping_rounds.is_some() {
			monitor.best_iteration()
		} else {
			trees.len()
		};
		self.boosting_history = Some(BoostingHistory {
			iterations,
			train_loss,
			validation_loss,
		});
		self.base_score = base_score;
		self.trees = trees;
		self.tree_attributes = tree_attributes;
		self.target_name = Some(target.to_owned());
		self.attributes = attributes.to_vec();
		self.feature_types = feature_types.clone();
		Ok(())
	}

	/// The raw additive score for a sample: the base score plus the learning-rate-scaled outputs of the first `best_iteration` trees.
	pub fn predict_score(&self, sample: &Row) -> Result<f64, PredictError> {
		if self.target_name.is_none() {
			return Err(PredictError::NotTrained);
		}
		if self.trees.is_empty() {
			return Err(PredictError::EmptyEnsemble);
		}
		let mut score = self.base_score;
		for tree in self.trees.iter().take(self.best_iteration) {
			score += self.options.learning_rate * tree_output(tree, sample);
		}
		Ok(score)
	}

	/// Predict for a sample. The binary objective thresholds the logistic probability at one half; the other objectives return the raw score as a number.
	pub fn predict(&self, sample: &Row) -> Result<Value, PredictError> {
		let score = self.predict_score(sample)?;
		match self.options.objective {
			Objective::Binary => Ok(Value::Bool(sigmoid(score) > 0.5)),
			Objective::Regression | Objective::Multiclass => Ok(Value::Number(score)),
		}
	}
}

/// Coerce the target column to numbers, failing on the first value that does not coerce.
fn numeric_targets(rows: &[Row], target: &str) -> Result<Vec<f64>, TrainError> {
	rows.iter()
		.map(|row| {
			value_of(row, target)
				.as_number()
				.ok_or_else(|| TrainError::NonNumericTarget(target.to_owned()))
		})
		.collect()
}

/// The constant initial prediction: the target mean for regression, the log-odds of the positive rate for binary classification, and zero otherwise.
fn base_score(objective: Objective, targets: ArrayView1<f64>) -> f64 {
	match objective {
		Objective::Regression => {
			if targets.is_empty() {
				0.0
			} else {
				targets.sum() / targets.len().to_f64().unwrap()
			}
		}
		Objective::Binary => {
			let p = if targets.is_empty() {
				0.5
			} else {
				targets.sum() / targets.len().to_f64().unwrap()
			};
			(p.max(EPS) / (1.0 - p + EPS)).ln()
		}
		Objective::Multiclass => 0.0,
	}
}

/// A tree's numeric output for one sample. Weighted trees always carry numeric leaves.
fn tree_output(tree: &TreeNode, sample: &Row) -> f64 {
	predict(tree, sample).as_number().unwrap_or(0.0)
}

/// Draw `max(1, floor(fraction·n))` row indices without replacement.
fn sample_fraction(n: usize, fraction: f64, rng: &mut Lcg) -> Vec<usize> {
	let mut indices: Vec<usize> = (0..n).collect();
	if fraction >= 1.0 {
		return indices;
	}
	let count = (fraction * n.to_f64().unwrap())
		.floor()
		.to_usize()
		.unwrap()
		.max(1);
	shuffle(&mut indices, rng);
	indices.truncate(count);
	indices
}

/// Draw `max(1, floor(fraction·k))` attributes without replacement.
fn sample_attributes(attributes: &[String], fraction: f64, rng: &mut Lcg) -> Vec<String> {
	let mut selected = attributes.to_vec();
	if fraction >= 1.0 {
		return selected;
	}
	let count = (fraction * attributes.len().to_f64().unwrap())
		.floor()
		.to_usize()
		.unwrap()
		.max(1);
	shuffle(&mut selected, rng);
	selected.truncate(count);
	selected
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn step_rows() -> Vec<Row> {
	(1..=10)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(if x <= 5 { 1.0 } else { 3.0 }),
			}
		})
		.collect()
}

#[cfg(test)]
fn continuous_x() -> FeatureTypes {
	btreemap! { "x".to_owned() => arbor_data::FeatureType::Continuous }
}

#[test]
fn test_training_loss_decreases() {
	let rows = step_rows();
	let options = BoostOptions {
		n_estimators: 30,
		validation_fraction: 0.0,
		..BoostOptions::default()
	};
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		options,
	)
	.unwrap();
	let history = model.boosting_history.as_ref().unwrap();
	assert_eq!(history.iterations.len(), 30);
	assert_eq!(history.iterations.last(), Some(&30));
	assert_eq!(history.train_loss.len(), 30);
	assert!(history.validation_loss.is_empty());
	assert!(history.train_loss.last().unwrap() < history.train_loss.first().unwrap());
	assert_eq!(model.best_iteration, 30);
}

#[test]
fn test_regression_predictions_approach_targets() {
	let rows = step_rows();
	let options = BoostOptions {
		n_estimators: 50,
		learning_rate: 0.3,
		validation_fraction: 0.0,
		early_stopping_rounds: None,
		..BoostOptions::default()
	};
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		options,
	)
	.unwrap();
	let sample = btreemap! { "x".to_owned() => Value::from(2.0) };
	let prediction = model.predict_score(&sample).unwrap();
	assert!((prediction - 1.0).abs() < 0.1);
	let sample = btreemap! { "x".to_owned() => Value::from(8.0) };
	let prediction = model.predict_score(&sample).unwrap();
	assert!((prediction - 3.0).abs() < 0.1);
}

#[test]
fn test_binary_objective_predicts_booleans() {
	let rows: Vec<Row> = (1..=10)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(x > 5),
			}
		})
		.collect();
	let options = BoostOptions {
		n_estimators: 30,
		learning_rate: 0.5,
		objective: Objective::Binary,
		validation_fraction: 0.0,
		..BoostOptions::default()
	};
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		options,
	)
	.unwrap();
	let sample = btreemap! { "x".to_owned() => Value::from(2.0) };
	assert_eq!(model.predict(&sample).unwrap(), Value::Bool(false));
	let sample = btreemap! { "x".to_owned() => Value::from(9.0) };
	assert_eq!(model.predict(&sample).unwrap(), Value::Bool(true));
}

#[test]
fn test_early_stopping_tracks_the_best_round() {
	let rows: Vec<Row> = (0..40)
		.map(|x| {
			btreemap! {
				"x".to_owned() => Value::from(x as f64),
				"y".to_owned() => Value::from(if x < 20 { 1.0 } else { 3.0 }),
			}
		})
		.collect();
	let options = BoostOptions {
		n_estimators: 100,
		validation_fraction: 0.25,
		early_stopping_rounds: Some(3),
		..BoostOptions::default()
	};
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		options,
	)
	.unwrap();
	let history = model.boosting_history.as_ref().unwrap();
	assert_eq!(history.validation_loss.len(), history.iterations.len());
	assert!(model.best_iteration <= history.iterations.len());
	assert!(model.best_iteration >= 1);
	// The recorded best iteration is the first round that achieved the minimum validation loss.
	let mut best_round = 0;
	for (round, loss) in history.validation_loss.iter().enumerate() {
		if *loss < history.validation_loss[best_round] {
			best_round = round;
		}
	}
	assert_eq!(model.best_iteration, best_round + 1);
}

#[test]
fn test_same_seed_trains_identical_models() {
	let rows = step_rows();
	let left = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		BoostOptions::default(),
	)
	.unwrap();
	let right = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		BoostOptions::default(),
	)
	.unwrap();
	assert_eq!(
		left.to_serialized().unwrap(),
		right.to_serialized().unwrap()
	);
}

#[test]
fn test_serialized_round_trip_predicts_identically() {
	let rows = step_rows();
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		BoostOptions::default(),
	)
	.unwrap();
	let serialized = model.to_serialized().unwrap();
	let rehydrated = GradientBoosting::from_serialized(&serialized).unwrap();
	for row in rows.iter() {
		assert_eq!(
			model.predict_score(row).unwrap(),
			rehydrated.predict_score(row).unwrap()
		);
	}
}

#[test]
fn test_non_numeric_target_is_an_error() {
	let rows: Vec<Row> = vec![
		btreemap! {
			"x".to_owned() => Value::from(1.0),
			"y".to_owned() => Value::from("not a number"),
		},
	];
	let result = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		BoostOptions::default(),
	);
	assert!(matches!(result, Err(TrainError::NonNumericTarget(_))));
}

#[test]
fn test_untrained_and_empty_ensembles_raise_on_predict() {
	let model = GradientBoosting::from_config(BoostOptions::default()).unwrap();
	let sample = btreemap! { "x".to_owned() => Value::from(1.0) };
	assert!(matches!(
		model.predict(&sample),
		Err(PredictError::NotTrained)
	));
	let rows = step_rows();
	let options = BoostOptions {
		n_estimators: 0,
		..BoostOptions::default()
	};
	let model = GradientBoosting::train_new(
		&rows,
		"y",
		&["x".to_owned()],
		&continuous_x(),
		options,
	)
	.unwrap();
	assert!(matches!(
		model.predict(&sample),
		Err(PredictError::EmptyEnsemble)
	));
}

#[test]
fn test_invalid_options_are_rejected() {
	let options = BoostOptions {
		learning_rate: 0.0,
		..BoostOptions::default()
	};
	assert!(GradientBoosting::from_config(options).is_err());
	let options = BoostOptions {
		subsample: 0.0,
		..BoostOptions::default()
	};
	assert!(GradientBoosting::from_config(options).is_err());
	let options = BoostOptions {
		validation_fraction: 1.0,
		..BoostOptions::default()
	};
	assert!(GradientBoosting::from_config(options).is_err());
}
