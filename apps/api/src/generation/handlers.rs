//! Axum route handlers for the Generation API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::generation::generator::{BackendSettings, DefaultPrompts, DEFAULT_PROMPTS};
use crate::pipeline::{SettingsUpdate, SourceRequest};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub tex_content: String,
}

#[derive(Debug, Deserialize)]
pub struct TemplateRenderRequest {
    pub template_content: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Deserialize)]
pub struct FixRequest {
    pub source: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct FixResponse {
    pub fixed_content: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub backend: BackendSettings,
    pub system_prompt: Option<String>,
    pub system_prompt_fix: Option<String>,
    pub latex_compiler: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/source
///
/// Generates LaTeX source from a job description and profile data. A
/// `template_name` of `custom` with template content has the model fill that
/// template directly; any other name renders the named template.
pub async fn handle_generate_source(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<SourceResponse>, AppError> {
    if request.template_name.trim().is_empty() {
        return Err(AppError::Validation(
            "template_name cannot be empty".to_string(),
        ));
    }

    let tex_content = state.pipeline.generate_source(request).await?;
    Ok(Json(SourceResponse { tex_content }))
}

/// POST /api/v1/templates/render
///
/// Fills caller-supplied template text (`\VAR{..}` / `\BLOCK{..}`) with the
/// given content. No model call is made.
pub async fn handle_render_template(
    State(state): State<AppState>,
    Json(request): Json<TemplateRenderRequest>,
) -> Result<Json<SourceResponse>, AppError> {
    if request.template_content.trim().is_empty() {
        return Err(AppError::Validation(
            "template_content cannot be empty".to_string(),
        ));
    }

    let tex_content = state
        .pipeline
        .render_template(&request.template_content, &request.context)
        .await?;
    Ok(Json(SourceResponse { tex_content }))
}

/// POST /api/v1/resumes/fix
pub async fn handle_fix_source(
    State(state): State<AppState>,
    Json(request): Json<FixRequest>,
) -> Result<Json<FixResponse>, AppError> {
    if request.source.trim().is_empty() {
        return Err(AppError::Validation("source cannot be empty".to_string()));
    }

    let fixed_content = state.pipeline.fix(&request.source, &request.error).await?;
    Ok(Json(FixResponse { fixed_content }))
}

/// GET /api/v1/settings
///
/// The credential itself is never returned, only whether one is set.
pub async fn handle_get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(settings_response(&state))
}

/// PUT /api/v1/settings
///
/// Atomically replaces the backend configuration and prompt overrides.
/// Changes last until the process exits.
pub async fn handle_update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, AppError> {
    if update.model.trim().is_empty() {
        return Err(AppError::Validation("model cannot be empty".to_string()));
    }

    state.pipeline.update_settings(update);
    Ok(Json(settings_response(&state)))
}

/// GET /api/v1/prompts/defaults
pub async fn handle_default_prompts() -> Json<DefaultPrompts> {
    Json(DEFAULT_PROMPTS)
}

fn settings_response(state: &AppState) -> SettingsResponse {
    let prompts = state.pipeline.prompts();
    SettingsResponse {
        backend: state.pipeline.generator().settings(),
        system_prompt: prompts.system_prompt,
        system_prompt_fix: prompts.system_prompt_fix,
        latex_compiler: state.config.compiler.clone(),
    }
}
