//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use predict_service::model::{Forward, GraphModel, ServingModel, Tensor, TensorMeter, TensorSpec};
use predict_service::pipeline::{PersistError, PredictionStore, RecordId, StoredPrediction};
use predict_service::server::{create_router, AppState, ServerConfig};
use predict_service::PredictError;

/// Linear model: `bias + sum(weights[i] * x[i])` over a `[1, dim]` input
pub struct LinearGraph {
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    weights: Vec<f32>,
    bias: f32,
    meter: Arc<TensorMeter>,
}

impl LinearGraph {
    pub fn new(weights: Vec<f32>, bias: f32) -> Arc<Self> {
        Arc::new(Self {
            inputs: vec![TensorSpec::new("float_input", vec![None, Some(weights.len())])],
            outputs: vec![TensorSpec::new("variable", vec![None, Some(1)])],
            weights,
            bias,
            meter: TensorMeter::new(),
        })
    }
}

impl GraphModel for LinearGraph {
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
        let result = match inputs.get("float_input") {
            Some(x) => {
                let y = x
                    .view()
                    .iter()
                    .zip(&self.weights)
                    .map(|(a, w)| a * w)
                    .sum::<f32>()
                    + self.bias;
                Tensor::from_shape_vec(&self.meter, &[1, 1], vec![y])
            }
            None => Err(PredictError::Execution("missing float_input".to_string())),
        };
        Forward::Immediate(result.map(|t| vec![t]))
    }
}

pub struct FailingStore;

#[async_trait]
impl PredictionStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn save(&self, _record: &StoredPrediction) -> Result<RecordId, PersistError> {
        Err(PersistError::Unavailable("connection refused".to_string()))
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        model_version: "v1.0".to_string(),
        model_base_url: None,
        model_dir: None,
        ..Default::default()
    }
}

pub fn test_state(store: Arc<dyn PredictionStore>) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), store))
}

pub fn publish(state: &AppState, graph: Arc<LinearGraph>) {
    let dim = graph.weights.len();
    let model = ServingModel::new("v1.0", graph, "float_input", "variable", dim).unwrap();
    state.registry().publish(model).unwrap();
}

pub fn app(state: Arc<AppState>) -> Router {
    create_router(state, &test_config())
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}
