/*!
This module contains the split criteria: pure functions that compute an impurity score for a set of labels or numeric residuals. Information gain for a candidate split is the parent's impurity minus the sample-weighted sum of the children's impurities.
*/

use arbor_data::Value;
use num_traits::ToPrimitive;

/// The impurity criterion used to score candidate splits. Gini and entropy apply to classification, mse and mae to regression.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Criterion {
	#[serde(rename = "gini")]
	Gini,
	#[serde(rename = "entropy")]
	Entropy,
	#[serde(rename = "mse")]
	Mse,
	#[serde(rename = "mae")]
	Mae,
}

impl Criterion {
	pub fn is_regression(self) -> bool {
		matches!(self, Criterion::Mse | Criterion::Mae)
	}

	/// Compute the impurity of `labels` under this criterion. For the regression criteria, labels that do not coerce to a number are skipped.
	pub fn impurity(self, labels: &[&Value]) -> f64 {
		match self {
			Criterion::Gini => gini(labels),
			Criterion::Entropy => entropy(labels),
			Criterion::Mse => mean_squared_error(&numbers(labels)),
			Criterion::Mae => mean_absolute_error(&numbers(labels)),
		}
	}
}

fn numbers(labels: &[&Value]) -> Vec<f64> {
	labels.iter().filter_map(|label| label.as_number()).collect()
}

/// Count how often each distinct label occurs, in first-encountered order.
fn frequencies<'a>(labels: &[&'a Value]) -> Vec<(&'a Value, usize)> {
	let mut groups: Vec<(&Value, usize)> = Vec::new();
	for &label in labels {
		match groups.iter_mut().find(|(value, _)| *value == label) {
			Some(group) => group.1 += 1,
			None => groups.push((label, 1)),
		}
	}
	groups
}

/// The entropy of a label distribution, `−Σ p·log2(p)`. An empty input has entropy 0, and `0·log2(0)` is defined as 0.
pub fn entropy(labels: &[&Value]) -> f64 {
	if labels.is_empty() {
		return 0.0;
	}
	let n = labels.len().to_f64().unwrap();
	frequencies(labels)
		.iter()
		.map(|(_, count)| {
			let p = count.to_f64().unwrap() / n;
			-p * p.log2()
		})
		.sum()
}

/// The Gini impurity of a label distribution, `1 − Σ p²`. An empty input has impurity 0.
pub fn gini(labels: &[&Value]) -> f64 {
	if labels.is_empty() {
		return 0.0;
	}
	let n = labels.len().to_f64().unwrap();
	let sum_squared: f64 = frequencies(labels)
		.iter()
		.map(|(_, count)| {
			let p = count.to_f64().unwrap() / n;
			p * p
		})
		.sum();
	1.0 - sum_squared
}

/// The mean of `values`, or 0 for an empty input.
pub fn mean(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	values.iter().sum::<f64>() / values.len().to_f64().unwrap()
}

/// The mean squared deviation from the mean.
pub fn mean_squared_error(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	let mean = mean(values);
	values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len().to_f64().unwrap()
}

/// The mean absolute deviation from the mean.
pub fn mean_absolute_error(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	let mean = mean(values);
	values.iter().map(|value| (value - mean).abs()).sum::<f64>() / values.len().to_f64().unwrap()
}

/// The most frequent label. Ties go to the label encountered first, so the result is deterministic for a given iteration order.
pub fn mode(labels: &[&Value]) -> Value {
	let mut best: Option<(&Value, usize)> = None;
	for (value, count) in frequencies(labels) {
		if best.map_or(true, |(_, best_count)| count > best_count) {
			best = Some((value, count));
		}
	}
	best.map(|(value, _)| value.clone()).unwrap_or(Value::Unknown)
}

/// The information gain of a candidate split: the parent's impurity minus the weighted sum of the children's impurities, weighted by each child's share of the parent's rows.
pub fn information_gain(
	criterion: Criterion,
	parent_impurity: f64,
	parent_size: usize,
	children: &[Vec<&Value>],
) -> f64 {
	let n = parent_size.to_f64().unwrap();
	let weighted_child_impurity: f64 = children
		.iter()
		.map(|child| child.len().to_f64().unwrap() / n * criterion.impurity(child))
		.sum();
	parent_impurity - weighted_child_impurity
}

#[cfg(test)]
fn labels(values: &[Value]) -> Vec<&Value> {
	values.iter().collect()
}

#[test]
fn test_entropy_of_pure_labels_is_zero() {
	let values = vec![Value::from("a"), Value::from("a"), Value::from("a")];
	assert_eq!(entropy(&labels(&values)), 0.0);
	assert_eq!(gini(&labels(&values)), 0.0);
}

#[test]
fn test_entropy_of_uniform_distribution_is_log2_k() {
	let values = vec![
		Value::from("a"),
		Value::from("b"),
		Value::from("c"),
		Value::from("d"),
	];
	assert!((entropy(&labels(&values)) - 2.0).abs() < 1e-12);
	let values = vec![Value::from("a"), Value::from("b")];
	assert!((entropy(&labels(&values)) - 1.0).abs() < 1e-12);
	assert!((gini(&labels(&values)) - 0.5).abs() < 1e-12);
}

#[test]
fn test_empty_input_has_zero_impurity() {
	assert_eq!(entropy(&[]), 0.0);
	assert_eq!(gini(&[]), 0.0);
	assert_eq!(mean_squared_error(&[]), 0.0);
	assert_eq!(mean_absolute_error(&[]), 0.0);
}

#[test]
fn test_regression_impurities() {
	let values = vec![1.0, 2.0, 3.0];
	assert!((mean_squared_error(&values) - 2.0 / 3.0).abs() < 1e-12);
	assert!((mean_absolute_error(&values) - 2.0 / 3.0).abs() < 1e-12);
	assert_eq!(mean_squared_error(&[5.0, 5.0]), 0.0);
}

#[test]
fn test_mode_breaks_ties_by_first_encountered() {
	let values = vec![
		Value::from("b"),
		Value::from("a"),
		Value::from("a"),
		Value::from("b"),
	];
	assert_eq!(mode(&labels(&values)), Value::from("b"));
	assert_eq!(mode(&[]), Value::Unknown);
}

#[test]
fn test_information_gain_of_perfect_split() {
	let parent = vec![
		Value::from("lo"),
		Value::from("lo"),
		Value::from("hi"),
		Value::from("hi"),
	];
	let parent_labels = labels(&parent);
	let parent_impurity = entropy(&parent_labels);
	let children = vec![
		vec![&parent[0], &parent[1]],
		vec![&parent[2], &parent[3]],
	];
	let gain = information_gain(Criterion::Entropy, parent_impurity, 4, &children);
	assert!((gain - 1.0).abs() < 1e-12);
}
