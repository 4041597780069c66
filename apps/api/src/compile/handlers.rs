//! Axum route handlers for the Render API.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub tex_content: String,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub pdf_base64: String,
    pub compiled_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    /// Whether a live compiler process was terminated.
    pub killed_process: bool,
}

/// POST /api/v1/render
///
/// Compiles LaTeX source into a PDF and returns it base64-encoded.
pub async fn handle_render(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    if request.tex_content.trim().is_empty() {
        return Err(AppError::Validation(
            "tex_content cannot be empty".to_string(),
        ));
    }

    let artifact = state.pipeline.compile(&request.tex_content).await?;
    let pdf_base64 = artifact
        .to_base64()
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("Reading compiled PDF")))?;

    Ok(Json(RenderResponse {
        pdf_base64,
        compiled_at: artifact.compiled_at,
        attempts: artifact.attempts,
    }))
}

/// GET /api/v1/render/latest
///
/// Raw bytes of the most recently compiled PDF.
pub async fn handle_latest_pdf(State(state): State<AppState>) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound("No PDF has been compiled yet".to_string());

    let path = state.pipeline.last_artifact().await.ok_or_else(not_found)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(AppError::Internal(e.into())),
    };

    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes).into_response())
}

/// POST /api/v1/cancel
///
/// Cancels in-flight generation and kills the running compiler, if any.
pub async fn handle_cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let killed_process = state.pipeline.cancel();
    Json(CancelResponse {
        cancelled: true,
        killed_process,
    })
}
