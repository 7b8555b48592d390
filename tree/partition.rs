/*!
Helpers for partitioning a node's row indices during training. Builders recurse over index lists into the caller's row slice rather than cloning rows.
*/

use arbor_data::{value_of, Row, ToFinite, Value};

/// Group `indices` by the distinct values of `attribute`, preserving first-observation order. Rows missing the attribute group under `Value::Unknown` like any other distinct value.
pub fn partition_by_value(
	rows: &[Row],
	indices: &[usize],
	attribute: &str,
) -> Vec<(Value, Vec<usize>)> {
	let mut partitions: Vec<(Value, Vec<usize>)> = Vec::new();
	for &index in indices {
		let value = value_of(&rows[index], attribute);
		match partitions.iter_mut().find(|(v, _)| v == value) {
			Some((_, partition)) => partition.push(index),
			None => partitions.push((value.clone(), vec![index])),
		}
	}
	partitions
}

/// Split `indices` into the rows whose value for `attribute` is <= `threshold` and those above it. Values that do not coerce to a number go left, matching the predictor's fallback direction.
pub fn partition_by_threshold(
	rows: &[Row],
	indices: &[usize],
	attribute: &str,
	threshold: f64,
) -> (Vec<usize>, Vec<usize>) {
	let mut left = Vec::new();
	let mut right = Vec::new();
	for &index in indices {
		match value_of(&rows[index], attribute).as_number() {
			Some(value) if value > threshold => right.push(index),
			_ => left.push(index),
		}
	}
	(left, right)
}

/// The sorted distinct finite numeric values of `attribute` over `indices`.
pub fn distinct_numbers(rows: &[Row], indices: &[usize], attribute: &str) -> Vec<f64> {
	let mut values: Vec<_> = indices
		.iter()
		.filter_map(|&index| value_of(&rows[index], attribute).as_number())
		.filter_map(|value| value.to_finite().ok())
		.collect();
	values.sort();
	values.dedup();
	values.into_iter().map(|value| value.get()).collect()
}

/// The candidate thresholds for a continuous attribute: every midpoint between adjacent sorted distinct values.
pub fn midpoints(values: &[f64]) -> Vec<f64> {
	values
		.windows(2)
		.map(|pair| (pair[0] + pair[1]) / 2.0)
		.collect()
}

#[cfg(test)]
use maplit::btreemap;

#[test]
fn test_partition_by_value_preserves_first_seen_order() {
	let rows: Vec<Row> = vec![
		btreemap! { "color".to_owned() => Value::from("red") },
		btreemap! { "color".to_owned() => Value::from("blue") },
		btreemap! { "color".to_owned() => Value::from("red") },
		btreemap! {},
	];
	let indices = vec![0, 1, 2, 3];
	let partitions = partition_by_value(&rows, &indices, "color");
	assert_eq!(partitions.len(), 3);
	assert_eq!(partitions[0], (Value::from("red"), vec![0, 2]));
	assert_eq!(partitions[1], (Value::from("blue"), vec![1]));
	assert_eq!(partitions[2], (Value::Unknown, vec![3]));
}

#[test]
fn test_partition_by_threshold_sends_non_numeric_left() {
	let rows: Vec<Row> = vec![
		btreemap! { "x".to_owned() => Value::from(1.0) },
		btreemap! { "x".to_owned() => Value::from(5.0) },
		btreemap! { "x".to_owned() => Value::from("oops") },
	];
	let indices = vec![0, 1, 2];
	let (left, right) = partition_by_threshold(&rows, &indices, "x", 3.0);
	assert_eq!(left, vec![0, 2]);
	assert_eq!(right, vec![1]);
}

#[test]
fn test_distinct_numbers_and_midpoints() {
	let rows: Vec<Row> = vec![
		btreemap! { "x".to_owned() => Value::from(3.0) },
		btreemap! { "x".to_owned() => Value::from(1.0) },
		btreemap! { "x".to_owned() => Value::from(3.0) },
		btreemap! { "x".to_owned() => Value::from(2.0) },
	];
	let indices = vec![0, 1, 2, 3];
	let values = distinct_numbers(&rows, &indices, "x");
	assert_eq!(values, vec![1.0, 2.0, 3.0]);
	assert_eq!(midpoints(&values), vec![1.5, 2.5]);
}
