//! Request validation and prediction orchestration

use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{PredictError, Result};
use crate::inference::InferenceExecutor;
use crate::model::{ModelRegistry, ModelState, ServingModel};
use crate::monitoring::PerformanceMetrics;
use super::recorder::{PredictionRecorder, RecordId};

/// Body of a successful `/predict`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub prediction_id: Option<RecordId>,
    pub prediction: f32,
    pub timestamp: String,
    pub latency_ms: u64,
}

/// A request that passed validation
#[derive(Debug)]
pub struct ValidatedRequest {
    pub model: Arc<ServingModel>,
    pub features: Vec<f32>,
}

/// `null`, `false`, `0` and `""` count as absent
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn render_received(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "nothing".to_string(),
    }
}

/// Check a request against the published model.
///
/// Checks run in a fixed order and the first failure wins: readiness,
/// features present, meta object, `meta.featureCount`, then the feature array.
pub fn validate(registry: &ModelRegistry, features: Option<&Value>, meta: Option<&Value>) -> Result<ValidatedRequest> {
    let model = match registry.state() {
        ModelState::Ready(model) => model,
        ModelState::Uninitialized => {
            return Err(PredictError::NotReady {
                version: registry.version().to_string(),
            })
        }
    };
    let dim = model.input_dim();

    let features = match features {
        Some(f) if !is_blank(f) => f,
        _ => return Err(PredictError::Validation("Missing features".to_string())),
    };

    let meta = match meta {
        Some(Value::Object(meta)) => meta,
        _ => return Err(PredictError::Validation("Missing meta object".to_string())),
    };

    let feature_count = meta.get("featureCount");
    if feature_count.and_then(Value::as_f64) != Some(dim as f64) {
        return Err(PredictError::Validation(format!(
            "featureCount must be {}, received {}",
            dim,
            render_received(feature_count)
        )));
    }

    let shape_error = || PredictError::Validation(format!("features must be an array of {} numbers", dim));
    let items = features.as_array().ok_or_else(shape_error)?;
    if items.len() != dim {
        return Err(PredictError::Validation(format!(
            "features must be an array of {} numbers, received {}",
            dim,
            items.len()
        )));
    }

    let mut values = Vec::with_capacity(dim);
    for item in items {
        let v = item.as_f64().ok_or_else(shape_error)? as f32;
        if !v.is_finite() {
            return Err(PredictError::Validation("features must be finite numbers".to_string()));
        }
        values.push(v);
    }

    Ok(ValidatedRequest { model, features: values })
}

/// Validate, execute, time and record one prediction
#[derive(Debug)]
pub struct PredictionPipeline {
    registry: Arc<ModelRegistry>,
    executor: InferenceExecutor,
    recorder: Arc<PredictionRecorder>,
    metrics: Arc<PerformanceMetrics>,
}

impl PredictionPipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        recorder: Arc<PredictionRecorder>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            executor: InferenceExecutor::new(Arc::clone(&registry)),
            registry,
            recorder,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    pub fn recorder(&self) -> &Arc<PredictionRecorder> {
        &self.recorder
    }

    /// Predict from a whole request body (`{features, meta}`)
    pub async fn predict_body(&self, body: &Value) -> Result<PredictionResponse> {
        self.predict(body.get("features"), body.get("meta")).await
    }

    pub async fn predict(&self, features: Option<&Value>, meta: Option<&Value>) -> Result<PredictionResponse> {
        let request = validate(&self.registry, features, meta)?;
        let data_id = Uuid::new_v4().to_string();
        let span = info_span!("predict", data_id = %data_id, version = request.model.version());
        self.run(request, data_id).instrument(span).await
    }

    async fn run(&self, request: ValidatedRequest, data_id: String) -> Result<PredictionResponse> {
        let start = Instant::now();
        let prediction = match self.executor.execute(&request.features).await {
            Ok(p) => p,
            Err(e) => {
                self.metrics.record_error();
                error!(error = %e, "Inference failed");
                return Err(e);
            }
        };
        let elapsed = start.elapsed();
        let latency_ms = elapsed.as_millis() as u64;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.metrics.record_latency(elapsed.as_secs_f64() * 1000.0);

        let record = self.recorder.record(prediction, &timestamp, latency_ms, &data_id).await;
        info!(
            prediction,
            latency_ms,
            persisted = record.id.is_some(),
            "Prediction served"
        );

        Ok(PredictionResponse {
            prediction_id: record.id,
            prediction,
            timestamp,
            latency_ms,
        })
    }
}
