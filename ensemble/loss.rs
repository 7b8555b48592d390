/*!
Loss functions for the boosting engine. Each objective exposes the per-row gradient and hessian of its loss with respect to the current prediction, plus an aggregate loss over a batch of predictions.

The multiclass objective computes its per-row gradient and hessian with the same binary-style formula as the logistic objective, applied to the class score. This is a deliberate simplification rather than full multinomial softmax boosting; the stable `softmax` helper is still exposed for callers that post-process raw scores.
*/

use itertools::izip;
use ndarray::prelude::*;
use num_traits::{clamp, ToPrimitive};

/// The floor applied to probabilities before taking logarithms, to avoid `log(0)`.
pub const EPS: f64 = 1e-15;

/// The training objective: squared error for regression, logistic for binary classification, softmax cross-entropy for multiclass.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Objective {
	#[serde(rename = "regression")]
	Regression,
	#[serde(rename = "binary")]
	Binary,
	#[serde(rename = "multiclass")]
	Multiclass,
}

/// The logistic function, with the input clamped to ±500 so the exponential cannot overflow.
pub fn sigmoid(x: f64) -> f64 {
	1.0 / (1.0 + (-clamp(x, -500.0, 500.0)).exp())
}

/// Softmax over a score vector, computed with max subtraction for numerical stability.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
	let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
	let exps: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
	let total: f64 = exps.iter().sum();
	exps.into_iter().map(|exp| exp / total).collect()
}

impl Objective {
	/// The first derivative of the loss with respect to the prediction.
	pub fn gradient(self, prediction: f64, actual: f64) -> f64 {
		match self {
			Objective::Regression => prediction - actual,
			Objective::Binary | Objective::Multiclass => sigmoid(prediction) - actual,
		}
	}

	/// The second derivative of the loss with respect to the prediction.
	pub fn hessian(self, prediction: f64, _actual: f64) -> f64 {
		match self {
			Objective::Regression => 1.0,
			Objective::Binary | Objective::Multiclass => {
				let p = sigmoid(prediction);
				p * (1.0 - p)
			}
		}
	}

	/// The aggregate loss of raw predictions against actual targets: mean squared error for regression, mean negative log-likelihood for the classification objectives.
	pub fn loss(self, predictions: ArrayView1<f64>, actuals: ArrayView1<f64>) -> f64 {
		let n = predictions.len().to_f64().unwrap();
		match self {
			Objective::Regression => {
				izip!(predictions.iter(), actuals.iter())
					.map(|(prediction, actual)| (prediction - actual).powi(2))
					.sum::<f64>() / n
			}
			Objective::Binary | Objective::Multiclass => {
				izip!(predictions.iter(), actuals.iter())
					.map(|(prediction, actual)| {
						let p = clamp(sigmoid(*prediction), EPS, 1.0 - EPS);
						-(actual * p.ln() + (1.0 - actual) * (1.0 - p).ln())
					})
					.sum::<f64>() / n
			}
		}
	}

	/// Fill `gradients` and `hessians` for a batch of predictions.
	pub fn gradients_and_hessians(
		self,
		predictions: ArrayView1<f64>,
		actuals: ArrayView1<f64>,
		gradients: &mut Array1<f64>,
		hessians: &mut Array1<f64>,
	) {
		izip!(
			gradients.iter_mut(),
			hessians.iter_mut(),
			predictions.iter(),
			actuals.iter(),
		)
		.for_each(|(gradient, hessian, prediction, actual)| {
			*gradient = self.gradient(*prediction, *actual);
			*hessian = self.hessian(*prediction, *actual);
		});
	}
}

#[test]
fn test_squared_error_of_identical_vectors_is_zero() {
	let predictions = array![1.0, 2.0, 3.0];
	let actuals = array![1.0, 2.0, 3.0];
	assert_eq!(
		Objective::Regression.loss(predictions.view(), actuals.view()),
		0.0
	);
	let mut gradients = Array1::zeros(3);
	let mut hessians = Array1::zeros(3);
	Objective::Regression.gradients_and_hessians(
		predictions.view(),
		actuals.view(),
		&mut gradients,
		&mut hessians,
	);
	assert!(gradients.iter().all(|&g| g == 0.0));
	assert!(hessians.iter().all(|&h| h == 1.0));
}

#[test]
fn test_sigmoid_is_clamped_and_bounded() {
	assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
	assert!(sigmoid(1000.0) <= 1.0);
	assert!(sigmoid(-1000.0) >= 0.0);
	assert!(sigmoid(1000.0) > 0.999);
	assert!(sigmoid(-1000.0) < 0.001);
}

#[test]
fn test_logistic_gradient_and_hessian() {
	let g = Objective::Binary.gradient(0.0, 1.0);
	assert!((g - (-0.5)).abs() < 1e-12);
	let h = Objective::Binary.hessian(0.0, 1.0);
	assert!((h - 0.25).abs() < 1e-12);
}

#[test]
fn test_logistic_loss_is_finite_for_extreme_scores() {
	let predictions = array![1000.0, -1000.0];
	let actuals = array![0.0, 1.0];
	let loss = Objective::Binary.loss(predictions.view(), actuals.view());
	assert!(loss.is_finite());
	assert!(loss > 0.0);
}

#[test]
fn test_softmax_sums_to_one_and_is_stable() {
	let probabilities = softmax(&[1.0, 2.0, 3.0]);
	assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-12);
	assert!(probabilities[2] > probabilities[1] && probabilities[1] > probabilities[0]);
	// Max subtraction keeps very large scores from overflowing.
	let probabilities = softmax(&[1000.0, 1001.0]);
	assert!(probabilities.iter().all(|p| p.is_finite()));
	assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-12);
}
