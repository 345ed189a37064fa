// ABOUTME: Error type returned by every API handler.
// ABOUTME: Maps store, collaborator, and validation failures to a status code and a JSON {"error"} body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use resonator_audio::{EffectsError, GeneratorError, HfError};
use resonator_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("processing failed: {0}")]
    Effects(#[from] EffectsError),

    #[error(transparent)]
    HuggingFace(#[from] HfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(StoreError::UniqueConstraintViolation(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::InvalidSong(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Generator(GeneratorError::Inference(e)) | ApiError::HuggingFace(e) => e
                .status_code()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!("{} {}", status.as_u16(), message);
        } else {
            tracing::debug!("{} {}", status.as_u16(), message);
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
