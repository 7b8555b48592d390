use std::{
	cmp::Ordering,
	hash::{Hash, Hasher},
};
use thiserror::Error;

/// A finite `f64`. Ruling out NaN and infinity lets split thresholds and vote keys be sorted and hashed.
#[derive(Clone, Copy, Debug)]
pub struct Finite(f64);

#[derive(Debug, Error)]
#[error("not finite")]
pub struct NotFiniteError;

impl Finite {
	pub fn new(value: f64) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError)
		}
	}

	pub fn get(self) -> f64 {
		self.0
	}
}

impl std::fmt::Display for Finite {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl PartialEq for Finite {
	#[inline]
	fn eq(&self, other: &Self) -> bool {
		self.0.eq(&other.0)
	}
}

impl Eq for Finite {}

impl PartialOrd for Finite {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		self.0.partial_cmp(&other.0)
	}
}

impl Ord for Finite {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.partial_cmp(&other.0).unwrap()
	}
}

impl Hash for Finite {
	#[inline]
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.to_bits().hash(state);
	}
}

pub trait ToFinite {
	/// If the value is finite, return `Ok(Finite(self))`, otherwise return an error.
	fn to_finite(self) -> Result<Finite, NotFiniteError>;
}

impl ToFinite for f64 {
	fn to_finite(self) -> Result<Finite, NotFiniteError> {
		Finite::new(self)
	}
}

#[test]
fn test_finite() {
	assert!(1.0.to_finite().is_ok());
	assert!(f64::NAN.to_finite().is_err());
	assert!(f64::INFINITY.to_finite().is_err());
	let mut values = vec![
		3.0.to_finite().unwrap(),
		1.0.to_finite().unwrap(),
		2.0.to_finite().unwrap(),
	];
	values.sort();
	assert_eq!(
		values.iter().map(|v| v.get()).collect::<Vec<_>>(),
		vec![1.0, 2.0, 3.0]
	);
}
