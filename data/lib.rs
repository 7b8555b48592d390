/*!
This crate defines the value model shared by the tree builders and ensembles: rows are ordered maps from attribute names to loosely typed values, and a separate feature-type table labels each attribute as discrete or continuous. The feature-type classifier that produces the table is an external collaborator, so this crate only defines the shape it is consumed in.
*/

use std::collections::BTreeMap;

mod finite;

pub use finite::{Finite, NotFiniteError, ToFinite};

/// A single attribute value in a training row or a prediction sample. `Unknown` stands for a missing value and takes part in partitioning like any other distinct value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
	Unknown,
	Bool(bool),
	Number(f64),
	Text(String),
}

/// A training row or prediction sample. The map is ordered so that iteration over a row is deterministic.
pub type Row = BTreeMap<String, Value>;

impl Value {
	/// Coerce this value to a number. Bools coerce to 0 or 1 and text coerces if it parses as a float.
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Number(value) => Some(*value),
			Value::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
			Value::Text(value) => value.parse().ok(),
			Value::Unknown => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(value) => Some(*value),
			_ => None,
		}
	}

	pub fn is_unknown(&self) -> bool {
		matches!(self, Value::Unknown)
	}
}

impl std::fmt::Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Unknown => write!(f, ""),
			Value::Bool(value) => write!(f, "{}", value),
			Value::Number(value) => write!(f, "{}", value),
			Value::Text(value) => write!(f, "{}", value),
		}
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Number(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Text(value.to_owned())
	}
}

/// Whether an attribute holds categorical or numeric values. This classification is produced by an external feature-type classifier and consumed here as a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FeatureType {
	#[serde(rename = "discrete")]
	Discrete,
	#[serde(rename = "continuous")]
	Continuous,
}

/// The feature-type lookup table, one entry per attribute. Attributes absent from the table are treated as discrete.
pub type FeatureTypes = BTreeMap<String, FeatureType>;

/// Look up whether `attribute` is marked continuous. Absent attributes are discrete.
pub fn is_continuous(feature_types: &FeatureTypes, attribute: &str) -> bool {
	matches!(feature_types.get(attribute), Some(FeatureType::Continuous))
}

/// Retrieve the value of `attribute` in `row`, substituting `Unknown` when the attribute is missing.
pub fn value_of<'a>(row: &'a Row, attribute: &str) -> &'a Value {
	row.get(attribute).unwrap_or(&Value::Unknown)
}

#[test]
fn test_as_number() {
	assert_eq!(Value::Number(3.5).as_number(), Some(3.5));
	assert_eq!(Value::Bool(true).as_number(), Some(1.0));
	assert_eq!(Value::Bool(false).as_number(), Some(0.0));
	assert_eq!(Value::Text("2.25".to_owned()).as_number(), Some(2.25));
	assert_eq!(Value::Text("lo".to_owned()).as_number(), None);
	assert_eq!(Value::Unknown.as_number(), None);
}

#[test]
fn test_value_of_missing_attribute() {
	let row: Row = maplit::btreemap! {
		"x".to_owned() => Value::Number(1.0),
	};
	assert_eq!(value_of(&row, "x"), &Value::Number(1.0));
	assert_eq!(value_of(&row, "y"), &Value::Unknown);
}

#[test]
fn test_value_serde_round_trip() {
	let values = vec![
		Value::Unknown,
		Value::Bool(true),
		Value::Number(1.5),
		Value::Text("hi".to_owned()),
	];
	let json = serde_json::to_string(&values).unwrap();
	assert_eq!(json, r#"[null,true,1.5,"hi"]"#);
	let back: Vec<Value> = serde_json::from_str(&json).unwrap();
	assert_eq!(values, back);
}
