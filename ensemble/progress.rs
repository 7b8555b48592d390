/*!
Progress reporting for ensemble training. Callers pass a callback to the `train_with_progress` variants and receive counters they can poll from another thread.
*/

use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// Counts completed units of training work. Cloning shares the underlying counter.
#[derive(Clone, Debug)]
pub struct ProgressCounter {
	current: Arc<AtomicU64>,
	total: u64,
}

impl ProgressCounter {
	pub fn new(total: u64) -> Self {
		Self {
			current: Arc::new(AtomicU64::new(0)),
			total,
		}
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	pub fn get(&self) -> u64 {
		self.current.load(Ordering::Relaxed)
	}

	pub fn inc(&self, amount: u64) {
		self.current.fetch_add(amount, Ordering::Relaxed);
	}
}

/// This enum reports training progress: one tree per unit for forests, one boosting round per unit for gradient boosting.
#[derive(Debug)]
pub enum TrainProgress {
	BuildingTrees(ProgressCounter),
	Boosting(ProgressCounter),
}

#[test]
fn test_progress_counter_is_shared_across_clones() {
	let counter = ProgressCounter::new(10);
	let clone = counter.clone();
	counter.inc(3);
	clone.inc(2);
	assert_eq!(counter.get(), 5);
	assert_eq!(counter.total(), 10);
}
