/*!
The early stopping monitor for boosting. It tracks the best validation loss seen so far and signals a stop once that loss has failed to improve for a configured number of consecutive rounds.
*/

#[derive(Clone, Debug)]
pub struct EarlyStoppingMonitor {
	max_rounds_no_improve: usize,
	rounds_no_improve: usize,
	best_loss: Option<f64>,
	best_iteration: usize,
}

impl EarlyStoppingMonitor {
	pub fn new(max_rounds_no_improve: usize) -> Self {
		Self {
			max_rounds_no_improve,
			rounds_no_improve: 0,
			best_loss: None,
			best_iteration: 0,
		}
	}

	/// Update with this round's validation loss. Returns true if training should stop.
	pub fn update(&mut self, round_index: usize, loss: f64) -> bool {
		if self.best_loss.map_or(true, |best| loss < best) {
			self.best_loss = Some(loss);
			self.best_iteration = round_index + 1;
			self.rounds_no_improve = 0;
			false
		} else {
			self.rounds_no_improve += 1;
			self.rounds_no_improve >= self.max_rounds_no_improve
		}
	}

	/// The number of trees that achieved the best validation loss: predictions sum the first `best_iteration` trees.
	pub fn best_iteration(&self) -> usize {
		self.best_iteration
	}
}

#[test]
fn test_monitor_stops_after_rounds_without_improvement() {
	let mut monitor = EarlyStoppingMonitor::new(2);
	assert!(!monitor.update(0, 1.0));
	assert!(!monitor.update(1, 0.5));
	assert!(!monitor.update(2, 0.6));
	assert!(monitor.update(3, 0.7));
	assert_eq!(monitor.best_iteration(), 2);
}

#[test]
fn test_improvement_resets_the_counter() {
	let mut monitor = EarlyStoppingMonitor::new(2);
	assert!(!monitor.update(0, 1.0));
	assert!(!monitor.update(1, 1.1));
	assert!(!monitor.update(2, 0.9));
	assert!(!monitor.update(3, 1.0));
	assert!(monitor.update(4, 1.0));
	assert_eq!(monitor.best_iteration(), 3);
}
