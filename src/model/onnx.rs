//! ONNX graph backend on candle
//!
//! Graphs are parsed once and shared behind an `Arc`, so forward passes can
//! run concurrently. In [`ExecutionMode::Blocking`] evaluation happens on the
//! blocking pool and the request task only awaits completion.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use candle_core::{DType, Device, Tensor as CandleTensor};
use candle_onnx::onnx::{self, tensor_shape_proto::dimension, type_proto, ModelProto};
use prost::Message;
use tracing::{debug, info};

use crate::error::{PredictError, Result};
use super::backend::{Backend, ExecutionMode, Forward, GraphModel, TensorSpec};
use super::tensor::{Tensor, TensorMeter};

/// CPU backend evaluating ONNX graphs with `candle-onnx`
#[derive(Debug)]
pub struct OnnxBackend {
    mode: ExecutionMode,
    device: OnceLock<Device>,
}

impl OnnxBackend {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            device: OnceLock::new(),
        }
    }
}

#[async_trait]
impl Backend for OnnxBackend {
    fn name(&self) -> &str {
        "candle-cpu"
    }

    async fn initialize(&self) -> Result<()> {
        let device = Device::Cpu;
        // Probe allocation so a broken backend fails here rather than on first request
        CandleTensor::zeros((1, 1), DType::F32, &device)
            .map_err(|e| PredictError::Init(format!("backend probe failed: {}", e)))?;
        let _ = self.device.set(device);
        info!(backend = self.name(), mode = %self.mode, "Numeric backend initialized");
        Ok(())
    }

    async fn load_graph(&self, artifact: Bytes) -> Result<Arc<dyn GraphModel>> {
        let device = self
            .device
            .get()
            .cloned()
            .ok_or_else(|| PredictError::Init("backend used before initialization".to_string()))?;

        let proto = ModelProto::decode(artifact.as_ref())
            .map_err(|e| PredictError::Init(format!("invalid ONNX artifact: {}", e)))?;
        debug!(bytes = artifact.len(), producer = %proto.producer_name, "Decoded ONNX model");

        Ok(Arc::new(OnnxGraph::new(proto, device, self.mode)?))
    }
}

/// A decoded ONNX graph
pub struct OnnxGraph {
    proto: Arc<ModelProto>,
    device: Device,
    mode: ExecutionMode,
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    meter: Arc<TensorMeter>,
}

impl std::fmt::Debug for OnnxGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxGraph")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("mode", &self.mode)
            .finish()
    }
}

impl OnnxGraph {
    fn new(proto: ModelProto, device: Device, mode: ExecutionMode) -> Result<Self> {
        let graph = proto
            .graph
            .as_ref()
            .ok_or_else(|| PredictError::Init("ONNX model has no graph".to_string()))?;

        // Older exporters list weights among the graph inputs
        let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
        let inputs = graph
            .input
            .iter()
            .filter(|v| !initializers.contains(v.name.as_str()))
            .map(value_spec)
            .collect();
        let outputs = graph.output.iter().map(value_spec).collect();

        Ok(Self {
            proto: Arc::new(proto),
            device,
            mode,
            inputs,
            outputs,
            meter: TensorMeter::new(),
        })
    }
}

impl GraphModel for OnnxGraph {
    fn inputs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorSpec] {
        &self.outputs
    }

    fn meter(&self) -> &Arc<TensorMeter> {
        &self.meter
    }

    fn forward(&self, inputs: HashMap<String, Tensor>) -> Forward {
        let output_names: Vec<String> = self.outputs.iter().map(|o| o.name.clone()).collect();
        match self.mode {
            ExecutionMode::Inline => {
                Forward::Immediate(evaluate(&self.proto, &self.device, &self.meter, &output_names, inputs))
            }
            ExecutionMode::Blocking => {
                let proto = Arc::clone(&self.proto);
                let device = self.device.clone();
                let meter = Arc::clone(&self.meter);
                Forward::deferred(async move {
                    tokio::task::spawn_blocking(move || {
                        evaluate(&proto, &device, &meter, &output_names, inputs)
                    })
                    .await
                    .map_err(|e| PredictError::Execution(format!("forward task failed: {}", e)))?
                })
            }
        }
    }
}

fn value_spec(info: &onnx::ValueInfoProto) -> TensorSpec {
    let shape = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(tensor)) => tensor
            .shape
            .as_ref()
            .map(|s| {
                s.dim
                    .iter()
                    .map(|d| match &d.value {
                        Some(dimension::Value::DimValue(v)) if *v > 0 => Some(*v as usize),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    TensorSpec::new(info.name.clone(), shape)
}

fn evaluate(
    proto: &ModelProto,
    device: &Device,
    meter: &Arc<TensorMeter>,
    output_names: &[String],
    inputs: HashMap<String, Tensor>,
) -> Result<Vec<Tensor>> {
    let mut feeds = HashMap::with_capacity(inputs.len());
    for (name, tensor) in inputs {
        let values: Vec<f32> = tensor.view().iter().copied().collect();
        let fed = CandleTensor::from_vec(values, tensor.shape().to_vec(), device)?;
        feeds.insert(name, fed);
    }

    let mut produced = candle_onnx::simple_eval(proto, feeds)?;
    output_names
        .iter()
        .map(|name| {
            let out = produced
                .remove(name)
                .ok_or_else(|| PredictError::Execution(format!("graph did not produce output '{}'", name)))?;
            to_tensor(meter, &out)
        })
        .collect()
}

fn to_tensor(meter: &Arc<TensorMeter>, out: &CandleTensor) -> Result<Tensor> {
    let shape = out.dims().to_vec();
    let out = out.to_dtype(DType::F32)?;
    let values = if shape.is_empty() {
        vec![out.to_scalar::<f32>()?]
    } else {
        out.flatten_all()?.to_vec1::<f32>()?
    };
    Tensor::from_shape_vec(meter, &shape, values)
}
