//! Process-wide model registry
//!
//! Holds at most one [`ServingModel`]. The slot is written exactly once by the
//! loader; readers take `Arc` snapshots and never observe a partial model.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PredictError, Result};
use super::backend::GraphModel;

/// Snapshot of the registry as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub ready: bool,
    pub version: String,
    pub input_tensor_name: Option<String>,
    pub output_tensor_name: Option<String>,
    pub input_dim: Option<usize>,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// A warmed-up model and the signature needed to invoke it
pub struct ServingModel {
    version: String,
    input_name: String,
    output_name: String,
    input_dim: usize,
    graph: Arc<dyn GraphModel>,
    loaded_at: DateTime<Utc>,
}

impl ServingModel {
    pub fn new(
        version: impl Into<String>,
        graph: Arc<dyn GraphModel>,
        input_name: impl Into<String>,
        output_name: impl Into<String>,
        input_dim: usize,
    ) -> Result<Self> {
        let input_name = input_name.into();
        let output_name = output_name.into();
        if input_name.is_empty() || output_name.is_empty() || input_dim == 0 {
            return Err(PredictError::Init(
                "could not detect inputName/outputName/inputDim".to_string(),
            ));
        }
        Ok(Self {
            version: version.into(),
            input_name,
            output_name,
            input_dim,
            graph,
            loaded_at: Utc::now(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn graph(&self) -> &Arc<dyn GraphModel> {
        &self.graph
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            ready: true,
            version: self.version.clone(),
            input_tensor_name: Some(self.input_name.clone()),
            output_tensor_name: Some(self.output_name.clone()),
            input_dim: Some(self.input_dim),
            loaded_at: Some(self.loaded_at),
        }
    }
}

impl fmt::Debug for ServingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingModel")
            .field("version", &self.version)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_dim", &self.input_dim)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Lifecycle state of the single model
#[derive(Debug, Clone)]
pub enum ModelState {
    Uninitialized,
    Ready(Arc<ServingModel>),
}

/// Single source of truth for readiness
#[derive(Debug)]
pub struct ModelRegistry {
    version: String,
    slot: OnceLock<Arc<ServingModel>>,
}

impl ModelRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            slot: OnceLock::new(),
        }
    }

    /// Configured version label, known before the model loads
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> ModelState {
        match self.slot.get() {
            Some(model) => ModelState::Ready(Arc::clone(model)),
            None => ModelState::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn model(&self) -> Option<Arc<ServingModel>> {
        self.slot.get().cloned()
    }

    pub fn info(&self) -> ModelMetadata {
        match self.slot.get() {
            Some(model) => model.metadata(),
            None => ModelMetadata {
                ready: false,
                version: self.version.clone(),
                input_tensor_name: None,
                output_tensor_name: None,
                input_dim: None,
                loaded_at: None,
            },
        }
    }

    /// Publish the warmed-up model. Only the first call succeeds.
    pub fn publish(&self, model: ServingModel) -> Result<Arc<ServingModel>> {
        let model = Arc::new(model);
        self.slot
            .set(Arc::clone(&model))
            .map_err(|_| PredictError::Init("model already published".to_string()))?;
        Ok(model)
    }
}
