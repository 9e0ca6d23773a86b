use crate::dtos::{GenerateRequest, GenerateResponse};
use crate::error::GenerateError;
use crate::startup::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};

/// `POST /api/generate`
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, GenerateError> {
    let Json(payload) = payload.map_err(|e| GenerateError::InvalidRequest(e.body_text()))?;
    let request = payload.into_generation_request()?;

    let result = state.generator.generate(request).await?;

    Ok(Json(result.into()))
}
