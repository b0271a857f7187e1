//! Inference module
//!
//! Turns one feature vector into one clamped scalar prediction using the
//! model held by the [`ModelRegistry`](crate::model::ModelRegistry).

mod executor;

pub use executor::{clamp_prediction, run_forward, InferenceExecutor, PREDICTION_FLOOR};
