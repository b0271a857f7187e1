//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::pipeline::PredictionResponse;

use super::error::{Result, ServerError};
use super::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "predict",
    }))
}

pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let info = state.registry().info();
    if !info.ready {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "modelVersion": info.version,
                "message": "Model is still loading",
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "ready": true,
            "modelVersion": info.version,
        })),
    )
}

/// Takes the raw body so the readiness gate runs before JSON parsing
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<PredictionResponse>)> {
    let registry = state.registry();
    if !registry.is_ready() {
        return Err(ServerError::NotReady {
            version: registry.version().to_string(),
        });
    }

    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body).map_err(|_| ServerError::BadRequest("Invalid JSON format".to_string()))?
    };

    let response = state.pipeline.predict_body(&body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.stats())
}
