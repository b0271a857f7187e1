//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::model::ModelRegistry;
use crate::monitoring::PerformanceMetrics;
use crate::pipeline::{PredictionPipeline, PredictionRecorder, PredictionStore};

use super::ServerConfig;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: PredictionPipeline,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn PredictionStore>) -> Self {
        let registry = Arc::new(ModelRegistry::new(config.model_version.clone()));
        let recorder = Arc::new(PredictionRecorder::new(
            store,
            Duration::from_millis(config.persist_timeout_ms),
        ));
        let pipeline = PredictionPipeline::new(registry, recorder, Arc::new(PerformanceMetrics::default()));
        Self { config, pipeline }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.pipeline.registry()
    }

    /// Snapshot for the `/stats` endpoint
    pub fn stats(&self) -> serde_json::Value {
        let registry = self.registry();
        let live_tensors = registry
            .model()
            .map(|m| m.graph().meter().live())
            .unwrap_or(0);
        let metrics = self.pipeline.metrics();

        serde_json::json!({
            "model": registry.info(),
            "liveTensors": live_tensors,
            "store": self.pipeline.recorder().store_name(),
            "metrics": metrics.summary(),
            "latencyHistogram": metrics.histogram(),
        })
    }
}
