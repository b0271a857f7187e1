//! Prediction stores
//!
//! `open_store` picks an implementation from the persistence URL:
//!
//! | URL | Store |
//! |---|---|
//! | unset, `none` | [`DisabledStore`] |
//! | `memory:` | [`MemoryStore`] |
//! | `sqlite:...` | [`SqliteStore`] |
//! | `file://...`, `jsonl:...` | [`JsonlStore`] |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::info;

use crate::error::{PredictError, Result};
use super::recorder::{PersistError, PredictionStore, RecordId, StoredPrediction};

/// Build the store named by `url`
pub fn open_store(url: Option<&str>) -> Result<Arc<dyn PredictionStore>> {
    let target = url.map(str::trim).unwrap_or("");
    let store: Arc<dyn PredictionStore> = match target {
        "" | "none" => Arc::new(DisabledStore),
        "memory:" | "memory://" => Arc::new(MemoryStore::new()),
        u if u.starts_with("sqlite:") => Arc::new(SqliteStore::connect_lazy(u)?),
        u if u.starts_with("file://") => {
            let path = url::Url::parse(u)
                .ok()
                .and_then(|parsed| parsed.to_file_path().ok())
                .ok_or_else(|| PredictError::Config(format!("Invalid file URL: {}", u)))?;
            Arc::new(JsonlStore::new(path))
        }
        u if u.starts_with("jsonl:") => Arc::new(JsonlStore::new(&u["jsonl:".len()..])),
        other => {
            let scheme = other.split(':').next().unwrap_or(other);
            return Err(PredictError::Config(format!(
                "Unsupported persistence scheme '{}'. Use sqlite:, file://, jsonl:, memory: or none.",
                scheme
            )));
        }
    };
    info!(store = store.name(), "Prediction store configured");
    Ok(store)
}

/// Refuses every save
#[derive(Debug, Default)]
pub struct DisabledStore;

#[async_trait]
impl PredictionStore for DisabledStore {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn save(&self, _record: &StoredPrediction) -> std::result::Result<RecordId, PersistError> {
        Err(PersistError::Disabled)
    }
}

pub type MemoryRecords = Arc<RwLock<Vec<(RecordId, StoredPrediction)>>>;

/// Keeps saved records in process memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: MemoryRecords,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the underlying records, still valid after the store moves
    pub fn shared(&self) -> MemoryRecords {
        Arc::clone(&self.records)
    }

    pub async fn records(&self) -> Vec<(RecordId, StoredPrediction)> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, record: &StoredPrediction) -> std::result::Result<RecordId, PersistError> {
        let id = RecordId::generate();
        self.records.write().await.push((id.clone(), record.clone()));
        Ok(id)
    }
}

#[derive(Serialize)]
struct JsonlLine<'a> {
    #[serde(rename = "_id")]
    id: &'a RecordId,
    #[serde(flatten)]
    record: &'a StoredPrediction,
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    // Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PredictionStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn save(&self, record: &StoredPrediction) -> std::result::Result<RecordId, PersistError> {
        let id = RecordId::generate();
        let mut line = serde_json::to_vec(&JsonlLine { id: &id, record })
            .map_err(|e| PersistError::Write(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(id)
    }
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS predictions (
    id TEXT PRIMARY KEY,
    result REAL NOT NULL,
    timestamp TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    data_id TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const INSERT: &str = "INSERT INTO predictions (id, result, timestamp, latency_ms, data_id, created_at)
    VALUES (?, ?, ?, ?, ?, ?)";

/// SQLite-backed store.
///
/// The pool connects on first use, so an unreachable database only fails
/// individual saves.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    schema: OnceCell<()>,
}

impl SqliteStore {
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| PredictError::Config(format!("Invalid sqlite URL '{}': {}", url, e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(options);
        Ok(Self {
            pool,
            schema: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> std::result::Result<(), PersistError> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
                Ok::<(), PersistError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, record: &StoredPrediction) -> std::result::Result<RecordId, PersistError> {
        self.ensure_schema().await?;
        let id = RecordId::generate();
        sqlx::query(INSERT)
            .bind(id.as_str())
            .bind(f64::from(record.result))
            .bind(record.timestamp.as_str())
            .bind(record.latency_ms as i64)
            .bind(record.data_id.as_str())
            .bind(record.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }
}
