//! Best-effort prediction persistence
//!
//! A save never fails the prediction. Store errors, timeouts and task failures
//! all collapse into a record with no id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("persistence is disabled")]
    Disabled,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("save timed out after {0:?}")]
    Timeout(Duration),

    #[error("save task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Write(err.to_string())
    }
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                PersistError::Unavailable(err.to_string())
            }
            other => PersistError::Write(other.to_string()),
        }
    }
}

/// Layout written to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPrediction {
    pub result: f32,
    pub timestamp: String,
    pub latency_ms: u64,
    pub data_id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only sink for predictions
#[async_trait]
pub trait PredictionStore: Send + Sync {
    fn name(&self) -> &str;

    async fn save(&self, record: &StoredPrediction) -> Result<RecordId, PersistError>;
}

/// A prediction after the save settled. `id` is `None` when the save failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: Option<RecordId>,
    pub result: f32,
    pub timestamp: String,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

pub struct PredictionRecorder {
    store: Arc<dyn PredictionStore>,
    timeout: Duration,
}

impl PredictionRecorder {
    pub fn new(store: Arc<dyn PredictionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Save on a detached task and wait at most `timeout` for the outcome.
    ///
    /// On timeout the task keeps running; only the id is lost.
    pub async fn try_record(&self, record: StoredPrediction) -> Result<RecordId, PersistError> {
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(async move { store.save(&record).await });
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(PersistError::Task(join_err.to_string())),
            Err(_) => Err(PersistError::Timeout(self.timeout)),
        }
    }

    pub async fn record(&self, result: f32, timestamp: &str, latency_ms: u64, data_id: &str) -> PredictionRecord {
        let created_at = Utc::now();
        let stored = StoredPrediction {
            result,
            timestamp: timestamp.to_string(),
            latency_ms,
            data_id: data_id.to_string(),
            created_at,
        };

        let id = match self.try_record(stored).await {
            Ok(id) => {
                info!(prediction_id = %id, store = self.store.name(), "Prediction saved");
                Some(id)
            }
            Err(PersistError::Disabled) => {
                debug!("Persistence disabled, prediction not saved");
                None
            }
            Err(e) => {
                warn!(error = %e, store = self.store.name(), "Failed to save prediction");
                None
            }
        };

        PredictionRecord {
            id,
            result,
            timestamp: timestamp.to_string(),
            latency_ms,
            created_at,
        }
    }
}

impl fmt::Debug for PredictionRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionRecorder")
            .field("store", &self.store.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
