pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::compile::handlers as render;
use crate::generation::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route(
            "/api/v1/resumes/source",
            post(generation::handle_generate_source),
        )
        .route("/api/v1/resumes/fix", post(generation::handle_fix_source))
        .route(
            "/api/v1/templates/render",
            post(generation::handle_render_template),
        )
        .route(
            "/api/v1/settings",
            get(generation::handle_get_settings).put(generation::handle_update_settings),
        )
        .route(
            "/api/v1/prompts/defaults",
            get(generation::handle_default_prompts),
        )
        // Render API
        .route("/api/v1/render", post(render::handle_render))
        .route("/api/v1/render/latest", get(render::handle_latest_pdf))
        .route("/api/v1/cancel", post(render::handle_cancel))
        .with_state(state)
}
