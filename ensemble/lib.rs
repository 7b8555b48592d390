/*!
This crate implements the ensemble layer on top of the tree builders: a seeded sampler for reproducible randomness, loss functions with gradients and hessians, a random forest aggregator, and a gradient boosting engine with validation-driven early stopping.
*/

pub mod boosting;
pub mod early_stopping;
pub mod forest;
pub mod loss;
pub mod progress;
pub mod sampler;

pub use boosting::{BoostOptions, BoostingHistory, GradientBoosting};
pub use early_stopping::EarlyStoppingMonitor;
pub use forest::{ForestOptions, RandomForest};
pub use loss::Objective;
pub use progress::{ProgressCounter, TrainProgress};
pub use sampler::{Lcg, MaxFeatures, MaxFeaturesPolicy};
