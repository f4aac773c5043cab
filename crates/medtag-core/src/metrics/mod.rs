//! # Evaluation Metrics
//!
//! Classification report and confusion matrix over flattened tag
//! sequences, with label ordering supplied by the caller so matrices
//! line up with the tag vocabulary.

pub mod confusion;
pub mod report;

pub use confusion::ConfusionMatrix;
pub use report::{Averages, ClassMetrics, ClassificationReport};
