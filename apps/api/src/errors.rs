use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::compile::CompileError;
use crate::generation::GenerationError;
use crate::pipeline::PipelineError;
use crate::render::TemplateError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// User-initiated; reported distinctly from failures.
    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Compilation(CompileError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidUserData(_) => AppError::Validation(e.to_string()),
            PipelineError::Cancelled => AppError::Cancelled,
            PipelineError::Generation(e) => AppError::Generation(e),
            PipelineError::Template(e) => AppError::Template(e),
            PipelineError::Compile(e) => AppError::Compilation(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Cancelled => (
                StatusCode::CONFLICT,
                "CANCELLED",
                "Cancelled by user".to_string(),
            ),
            AppError::Generation(e) => {
                tracing::error!("Generation error: {e}");
                (StatusCode::BAD_GATEWAY, "GENERATION_ERROR", e.to_string())
            }
            AppError::Template(e) => {
                let status = match e {
                    TemplateError::NotFound(_) => StatusCode::NOT_FOUND,
                    TemplateError::InvalidName(_) => StatusCode::BAD_REQUEST,
                    TemplateError::Render(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    TemplateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "TEMPLATE_ERROR", e.to_string())
            }
            AppError::Compilation(e) => return compilation_response(e),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Compile failures carry enough context for a remediation flow: the extracted
/// diagnostics, and for a missing toolchain the untouched source.
fn compilation_response(e: &CompileError) -> Response {
    let (status, code) = match e {
        CompileError::ToolchainMissing { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "TOOLCHAIN_MISSING")
        }
        CompileError::Timeout { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "COMPILATION_TIMEOUT"),
        CompileError::Failed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "COMPILATION_FAILED"),
        CompileError::Cancelled => (StatusCode::CONFLICT, "CANCELLED"),
        CompileError::Io(err) => {
            tracing::error!("Compilation workspace error: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "COMPILATION_IO_ERROR")
        }
    };

    let mut error = json!({
        "code": code,
        "message": e.to_string(),
        "no_latex": e.is_missing_toolchain(),
    });
    match e {
        CompileError::ToolchainMissing { source_text, .. } => {
            error["tex_content"] = json!(source_text);
        }
        CompileError::Failed { diagnostics } => {
            error["diagnostics"] = json!(diagnostics);
        }
        _ => {}
    }

    (status, Json(json!({ "error": error }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_toolchain_returns_source() {
        let err = AppError::Compilation(CompileError::ToolchainMissing {
            guidance: "pdflatex not found.".to_string(),
            source_text: "\\documentclass{article}".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "TOOLCHAIN_MISSING");
        assert_eq!(body["error"]["no_latex"], true);
        assert_eq!(body["error"]["tex_content"], "\\documentclass{article}");
    }

    #[tokio::test]
    async fn test_compile_failure_carries_diagnostics() {
        let err = AppError::Compilation(CompileError::Failed {
            diagnostics: "! Undefined control sequence.".to_string(),
        });
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"]["no_latex"], false);
        assert_eq!(body["error"]["diagnostics"], "! Undefined control sequence.");
        assert!(body["error"].get("tex_content").is_none());
    }

    #[tokio::test]
    async fn test_timeout_message_names_the_limit() {
        let err = AppError::Compilation(CompileError::Timeout {
            timeout: Duration::from_secs(30),
        });
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"]["code"], "COMPILATION_TIMEOUT");
        assert_eq!(body["error"]["message"], "Compilation timed out (30s)");
    }

    #[test]
    fn test_pipeline_errors_map_to_app_errors() {
        let invalid = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AppError = PipelineError::InvalidUserData(invalid).into();
        assert!(matches!(&err, AppError::Validation(msg) if msg == "Invalid User Data JSON"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: AppError = PipelineError::Cancelled.into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
