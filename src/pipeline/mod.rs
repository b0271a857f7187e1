//! Prediction pipeline
//!
//! Validation, execution and best-effort recording of predictions.

mod predict;
mod recorder;
mod store;

pub use predict::{validate, PredictionPipeline, PredictionResponse, ValidatedRequest};
pub use recorder::{
    PersistError, PredictionRecord, PredictionRecorder, PredictionStore, RecordId, StoredPrediction,
};
pub use store::{open_store, DisabledStore, JsonlStore, MemoryRecords, MemoryStore, SqliteStore};
