/*!
The ensemble sampler: a seeded pseudo-random source plus bootstrap resampling and random feature-subset selection. Every ensemble draws its randomness from an explicitly passed `Lcg` instance, so the same seed and the same inputs always produce the same trees.
*/

use arbor_tree::TrainError;
use num_traits::ToPrimitive;

/// A linear congruential generator: `seed' = (seed·9301 + 49297) mod 233280`. The uniform value is `seed' / 233280`.
#[derive(Debug, Clone)]
pub struct Lcg {
	state: u64,
}

impl Lcg {
	pub fn new(seed: u64) -> Self {
		Self {
			state: seed % 233280,
		}
	}

	/// The next uniform value in `[0, 1)`.
	pub fn next(&mut self) -> f64 {
		self.state = (self.state * 9301 + 49297) % 233280;
		self.state.to_f64().unwrap() / 233280.0
	}

	/// A uniformly random index in `0..n`.
	pub fn gen_range(&mut self, n: usize) -> usize {
		let index = (self.next() * n.to_f64().unwrap()).floor().to_usize().unwrap();
		index.min(n.saturating_sub(1))
	}
}

/// Shuffle `items` in place with a Fisher–Yates pass driven by `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &mut Lcg) {
	for i in (1..items.len()).rev() {
		let j = rng.gen_range(i + 1);
		items.swap(i, j);
	}
}

/// Draw `n` row indices uniformly at random with replacement from `0..n_rows`.
pub fn bootstrap_sample(n_rows: usize, n: usize, rng: &mut Lcg) -> Result<Vec<usize>, TrainError> {
	if n_rows == 0 {
		return Err(TrainError::EmptyTrainingData);
	}
	Ok((0..n).map(|_| rng.gen_range(n_rows)).collect())
}

/// The policy for how many features each tree sees: `sqrt` and `auto` take `floor(sqrt(count))`, `log2` takes `floor(log2(count))`, and a number is capped at the attribute count. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MaxFeatures {
	Count(usize),
	Policy(MaxFeaturesPolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeaturesPolicy {
	#[serde(rename = "sqrt")]
	Sqrt,
	#[serde(rename = "log2")]
	Log2,
	#[serde(rename = "auto")]
	Auto,
}

impl Default for MaxFeatures {
	fn default() -> Self {
		MaxFeatures::Policy(MaxFeaturesPolicy::Auto)
	}
}

impl MaxFeatures {
	/// The number of features to select out of `count`.
	pub fn n_features(self, count: usize) -> usize {
		// log2(0) is -inf, so handle an empty attribute list before any math.
		if count == 0 {
			return 1;
		}
		let n = match self {
			MaxFeatures::Policy(MaxFeaturesPolicy::Sqrt)
			| MaxFeatures::Policy(MaxFeaturesPolicy::Auto) => {
				count.to_f64().unwrap().sqrt().floor().to_usize().unwrap()
			}
			MaxFeatures::Policy(MaxFeaturesPolicy::Log2) => {
				count.to_f64().unwrap().log2().floor().to_usize().unwrap()
			}
			MaxFeatures::Count(n) => n.min(count),
		};
		n.max(1)
	}
}

/// Select a random feature subset: shuffle a copy of the attribute list in place and truncate it to the policy's count. Every returned attribute comes from the original list without duplication.
pub fn select_random_features(
	attributes: &[String],
	max_features: MaxFeatures,
	rng: &mut Lcg,
) -> Vec<String> {
	let mut selected = attributes.to_vec();
	shuffle(&mut selected, rng);
	selected.truncate(max_features.n_features(attributes.len()));
	selected
}

#[test]
fn test_lcg_is_reproducible() {
	let mut a = Lcg::new(42);
	let mut b = Lcg::new(42);
	for _ in 0..100 {
		assert_eq!(a.next(), b.next());
	}
	// A different seed starts a different sequence.
	let mut c = Lcg::new(7);
	assert_ne!(Lcg::new(42).next(), c.next());
}

#[test]
fn test_lcg_values_are_in_unit_interval() {
	let mut rng = Lcg::new(1);
	for _ in 0..1000 {
		let value = rng.next();
		assert!((0.0..1.0).contains(&value));
	}
}

#[test]
fn test_bootstrap_sample_is_reproducible_and_in_range() {
	let mut a = Lcg::new(42);
	let mut b = Lcg::new(42);
	let left = bootstrap_sample(10, 10, &mut a).unwrap();
	let right = bootstrap_sample(10, 10, &mut b).unwrap();
	assert_eq!(left, right);
	assert_eq!(left.len(), 10);
	assert!(left.iter().all(|&index| index < 10));
}

#[test]
fn test_bootstrap_sample_of_zero_rows_is_an_error() {
	let mut rng = Lcg::new(42);
	assert!(bootstrap_sample(0, 5, &mut rng).is_err());
}

#[test]
fn test_max_features_counts() {
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Sqrt).n_features(9), 3);
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Auto).n_features(9), 3);
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Log2).n_features(8), 3);
	assert_eq!(MaxFeatures::Count(5).n_features(3), 3);
	assert_eq!(MaxFeatures::Count(2).n_features(3), 2);
	// Never select fewer than one feature.
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Sqrt).n_features(1), 1);
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Log2).n_features(1), 1);
}

#[test]
fn test_every_policy_handles_zero_attributes() {
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Sqrt).n_features(0), 1);
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Log2).n_features(0), 1);
	assert_eq!(MaxFeatures::Policy(MaxFeaturesPolicy::Auto).n_features(0), 1);
	assert_eq!(MaxFeatures::Count(3).n_features(0), 1);
	// Selecting from an empty attribute list yields an empty subset without panicking.
	let mut rng = Lcg::new(42);
	let selected = select_random_features(
		&[],
		MaxFeatures::Policy(MaxFeaturesPolicy::Log2),
		&mut rng,
	);
	assert!(selected.is_empty());
}

#[test]
fn test_select_random_features_draws_without_duplication() {
	let attributes: Vec<String> = (0..9).map(|i| format!("f{}", i)).collect();
	let mut rng = Lcg::new(42);
	let selected = select_random_features(&attributes, MaxFeatures::default(), &mut rng);
	assert_eq!(selected.len(), 3);
	for feature in selected.iter() {
		assert!(attributes.contains(feature));
	}
	let mut deduped = selected.clone();
	deduped.sort();
	deduped.dedup();
	assert_eq!(deduped.len(), selected.len());
	// The same seed selects the same subset.
	let mut rng = Lcg::new(42);
	assert_eq!(
		select_random_features(&attributes, MaxFeatures::default(), &mut rng),
		selected
	);
}

#[test]
fn test_max_features_serde_accepts_names_and_numbers() {
	let sqrt: MaxFeatures = serde_json::from_str("\"sqrt\"").unwrap();
	assert_eq!(sqrt, MaxFeatures::Policy(MaxFeaturesPolicy::Sqrt));
	let count: MaxFeatures = serde_json::from_str("4").unwrap();
	assert_eq!(count, MaxFeatures::Count(4));
}
