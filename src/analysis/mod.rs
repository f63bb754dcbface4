//! Analytics over assessment history.

pub mod aggregator;
pub mod comparator;
pub mod predictor;

pub use aggregator::*;
pub use comparator::{compare_frameworks, FrameworkComparison};
pub use predictor::{predict_scores, ScorePrediction};
