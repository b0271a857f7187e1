//! Prediction service - serve a pretrained regression model over HTTP
//!
//! The model is loaded once at startup, gated behind a readiness check, and
//! every prediction is optionally persisted without ever failing the caller.
//!
//! # Modules
//!
//! - [`model`] - Numeric backend, model registry and one-shot loader
//! - [`inference`] - Single-vector execution with output clamping
//! - [`pipeline`] - Request validation, orchestration and persistence
//! - [`monitoring`] - Latency and error metrics
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod inference;
pub mod model;
pub mod monitoring;
pub mod pipeline;

pub mod cli;
pub mod server;

pub use error::{PredictError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PredictError, Result};
    pub use crate::inference::InferenceExecutor;
    pub use crate::model::{
        Backend, ExecutionMode, Forward, GraphModel, ModelLoader, ModelMetadata, ModelRegistry, OnnxBackend,
        ServingModel, Tensor, TensorMeter, TensorSpec,
    };
    pub use crate::pipeline::{
        open_store, PersistError, PredictionPipeline, PredictionRecorder, PredictionResponse, PredictionStore,
        RecordId,
    };
    pub use crate::server::{create_router, run_server, AppState, ServerConfig};
}
