//! In-crate fakes for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use candle_onnx::onnx::{self, tensor_proto::DataType, tensor_shape_proto::dimension, type_proto, ModelProto};
use prost::Message;

use crate::error::{PredictError, Result};
use super::backend::{Backend, Forward, GraphModel, TensorSpec};
use super::tensor::{Tensor, TensorMeter};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Behaviour {
    Value(f32),
    /// Sum of the input features
    Sum,
    /// Rank-1 output, not addressable at `[0][0]`
    Rank1(f32),
    /// No outputs at all
    Empty,
    Fail,
}

pub(crate) struct FixedGraph {
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    meter: Arc<TensorMeter>,
    behaviour: Behaviour,
    deferred: bool,
    pub calls: AtomicUsize,
}

impl FixedGraph {
    pub fn new(dim: usize, value: f32) -> Arc<Self> {
        Self::with(dim, Behaviour::Value(value), false)
    }

    pub fn with(dim: usize, behaviour: Behaviour, deferred: bool) -> Arc<Self> {
        Self::with_specs(
            vec![TensorSpec::new("x", vec![None, Some(dim)])],
            vec![TensorSpec::new("y", vec![None, Some(1)])],
            behaviour,
            deferred,
        )
    }

    pub fn with_specs(
        inputs: Vec<TensorSpec>,
        outputs: Vec<TensorSpec>,
        behaviour: Behaviour,
        deferred: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            inputs,
            outputs,
            meter: TensorMeter::new(),
            behaviour,
            deferred,
            calls: AtomicUsize::new(0),
        })
    }

    fn run(meter: &Arc<TensorMeter>, behaviour: Behaviour, inputs: HashMap<String, Tensor>) -> Result<Vec<Tensor>> {
        let x = inputs
            .get("x")
            .ok_or_else(|| PredictError::Execution("missing input x".to_string()))?;
        match behaviour {
            Behaviour::Value(v) => Ok(vec![Tensor::from_shape_vec(meter, &[1, 1], vec![v])?]),
            Behaviour::Sum => {
                let sum = x.view().iter().sum::<f32>();
                Ok(vec![Tensor::from_shape_vec(meter, &[1, 1], vec![sum])?])
            }
            Behaviour::Rank1(v) => Ok(vec![Tensor::from_shape_vec(meter, &[1], vec![v])?]),
            Behaviour::Empty => Ok(Vec::new()),
            Behaviour::Fail => Err(PredictError::Execution("kernel panicked".to_string())),
        }
    }
}

impl GraphModel for FixedGraph {
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let meter = Arc::clone(&self.meter);
        let behaviour = self.behaviour;
        if self.deferred {
            Forward::deferred(async move {
                tokio::task::yield_now().await;
                Self::run(&meter, behaviour, inputs)
            })
        } else {
            Forward::Immediate(Self::run(&meter, behaviour, inputs))
        }
    }
}

/// Backend handing out a prepared graph
pub(crate) struct FakeBackend {
    graph: Arc<dyn GraphModel>,
    initialized: AtomicBool,
    fail_init: bool,
}

impl FakeBackend {
    pub fn new(graph: Arc<dyn GraphModel>) -> Self {
        Self {
            graph,
            initialized: AtomicBool::new(false),
            fail_init: false,
        }
    }

    pub fn failing(graph: Arc<dyn GraphModel>) -> Self {
        Self {
            fail_init: true,
            ..Self::new(graph)
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_init {
            return Err(PredictError::Init("no device".to_string()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn load_graph(&self, _artifact: Bytes) -> Result<Arc<dyn GraphModel>> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(PredictError::Init("backend used before initialization".to_string()));
        }
        Ok(Arc::clone(&self.graph))
    }
}

fn dim(value: Option<i64>) -> onnx::tensor_shape_proto::Dimension {
    onnx::tensor_shape_proto::Dimension {
        value: Some(match value {
            Some(v) => dimension::Value::DimValue(v),
            None => dimension::Value::DimParam("batch".to_string()),
        }),
        ..Default::default()
    }
}

fn value_info(name: &str, dims: Vec<Option<i64>>) -> onnx::ValueInfoProto {
    onnx::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(onnx::TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(onnx::TensorShapeProto {
                    dim: dims.into_iter().map(dim).collect(),
                }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Encoded ONNX graph computing `y = x · w` for a `[batch, 3]` input
pub(crate) fn linear_onnx(weights: [f32; 3]) -> Bytes {
    let raw: Vec<u8> = weights.iter().flat_map(|w| w.to_le_bytes()).collect();
    let w = onnx::TensorProto {
        name: "w".to_string(),
        dims: vec![3, 1],
        data_type: DataType::Float as i32,
        raw_data: raw,
        ..Default::default()
    };
    let graph = onnx::GraphProto {
        name: "linear".to_string(),
        node: vec![onnx::NodeProto {
            op_type: "MatMul".to_string(),
            input: vec!["x".to_string(), "w".to_string()],
            output: vec!["y".to_string()],
            ..Default::default()
        }],
        initializer: vec![w],
        input: vec![value_info("x", vec![None, Some(3)]), value_info("w", vec![Some(3), Some(1)])],
        output: vec![value_info("y", vec![None, Some(1)])],
        ..Default::default()
    };
    let model = ModelProto {
        ir_version: 8,
        graph: Some(graph),
        ..Default::default()
    };
    Bytes::from(model.encode_to_vec())
}
