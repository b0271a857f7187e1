//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::PredictError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Model {version} not ready")]
    NotReady { version: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PredictError> for ServerError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::NotReady { version } => ServerError::NotReady { version },
            PredictError::Validation(msg) => ServerError::BadRequest(msg),
            PredictError::Json(_) => ServerError::BadRequest("Invalid JSON format".to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::NotReady { version } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Model not ready",
                    "ready": false,
                    "modelVersion": version,
                    "message": "Model is still loading",
                }),
            ),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
