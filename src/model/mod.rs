//! Model lifecycle
//!
//! - [`Backend`] / [`GraphModel`] abstract the numeric runtime
//! - [`OnnxBackend`] runs ONNX graphs on candle
//! - [`ModelRegistry`] holds the single published model
//! - [`ModelLoader`] takes the model from unloaded to ready

mod backend;
mod loader;
mod onnx;
mod registry;
mod tensor;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, ExecutionMode, Forward, GraphModel, TensorSpec};
pub use loader::{artifact_url, introspect, ModelLoader, Signature, DEFAULT_ARTIFACT_PATH};
pub use onnx::{OnnxBackend, OnnxGraph};
pub use registry::{ModelMetadata, ModelRegistry, ModelState, ServingModel};
pub use tensor::{Tensor, TensorMeter};
