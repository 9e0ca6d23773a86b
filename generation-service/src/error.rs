//! Errors surfaced by `POST /api/generate`.

use crate::services::providers::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::{AppError, ErrorBody};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Prompt is required")]
    MissingPrompt,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl GenerateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GenerateError::MissingPrompt | GenerateError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GenerateError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            GenerateError::Provider(_) | GenerateError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            GenerateError::MissingPrompt
            | GenerateError::InvalidRequest(_)
            | GenerateError::InsufficientCredits => ErrorBody::new(self.to_string()),
            GenerateError::Provider(_) | GenerateError::Store(_) => {
                tracing::error!(error = %self, "Generation error");
                ErrorBody::with_message("Image generation failed", self.to_string())
            }
        };

        (status, Json(body)).into_response()
    }
}
