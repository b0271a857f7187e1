//! Single-vector inference against the registry's model

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PredictError, Result};
use crate::model::{GraphModel, ModelRegistry, ModelState, Tensor};

/// Lower bound applied to every prediction
pub const PREDICTION_FLOOR: f32 = 0.0;

/// Build a `[1, dim]` input, run the graph and return its outputs.
///
/// The input tensor moves into the backend and is released there, whether or
/// not the pass succeeds.
pub async fn run_forward(
    graph: &dyn GraphModel,
    input_name: &str,
    input_dim: usize,
    features: &[f32],
) -> Result<Vec<Tensor>> {
    let input = Tensor::from_shape_vec(graph.meter(), &[1, input_dim], features.to_vec())?;
    let inputs = HashMap::from([(input_name.to_string(), input)]);
    graph.forward(inputs).await
}

/// Read `[0][0]` of the first output and floor it at [`PREDICTION_FLOOR`].
///
/// A missing, misshapen or non-finite output counts as 0.
pub fn clamp_prediction(outputs: Vec<Tensor>) -> f32 {
    let raw = outputs.first().and_then(Tensor::first_scalar);
    let value = match raw {
        Some(v) if v.is_finite() => v,
        Some(v) => {
            warn!(raw = v, "Model produced a non-finite output, using 0");
            0.0
        }
        None => {
            warn!(outputs = outputs.len(), "Model output missing or malformed, using 0");
            0.0
        }
    };
    value.max(PREDICTION_FLOOR)
}

/// Stateless executor; every call reads the current model from the registry
#[derive(Debug, Clone)]
pub struct InferenceExecutor {
    registry: Arc<ModelRegistry>,
}

impl InferenceExecutor {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, features: &[f32]) -> Result<f32> {
        let model = match self.registry.state() {
            ModelState::Ready(model) => model,
            ModelState::Uninitialized => {
                return Err(PredictError::NotReady {
                    version: self.registry.version().to_string(),
                })
            }
        };
        if features.len() != model.input_dim() {
            return Err(PredictError::Validation(format!(
                "features must be an array of {} numbers, received {}",
                model.input_dim(),
                features.len()
            )));
        }

        let outputs = run_forward(model.graph().as_ref(), model.input_name(), model.input_dim(), features)
            .await
            .map_err(|e| match e {
                PredictError::Execution(_) => e,
                other => PredictError::Execution(other.to_string()),
            })?;
        let prediction = clamp_prediction(outputs);
        debug!(prediction, live_tensors = model.graph().meter().live(), "Inference complete");
        Ok(prediction)
    }
}
