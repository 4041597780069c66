mod compile;
mod config;
mod errors;
mod generation;
mod llm_client;
mod models;
mod pipeline;
mod render;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::compile::toolchain::Toolchain;
use crate::compile::{CompilationEngine, EngineConfig};
use crate::config::Config;
use crate::generation::ContentGenerator;
use crate::pipeline::cancel::CancelFlag;
use crate::pipeline::{Pipeline, PromptOverrides};
use crate::render::TemplateRenderer;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Forge v{}", env!("CARGO_PKG_VERSION"));

    // One flag shared by the generator, the engine and the cancel endpoint
    let cancel = CancelFlag::new();

    // Initialize content generator
    let generator = ContentGenerator::new(
        config.provider,
        &config.api_key,
        &config.model,
        config.endpoints.clone(),
        cancel.clone(),
    )?;
    let settings = generator.settings();
    info!(
        "Content generator initialized (provider: {}, model: {})",
        settings.provider, settings.model
    );
    if !settings.api_key_configured && !config.provider.is_local() {
        warn!("No LLM_API_KEY set; generation will return placeholder content");
    }

    // Initialize template renderer
    let renderer = TemplateRenderer::new(&config.template_dir)?;
    info!("Templates loaded from {}", renderer.template_dir().display());

    // Initialize compilation engine
    let toolchain = Toolchain {
        compiler: config.compiler.clone(),
        repair_tool: config.repair_tool.clone(),
        ..Toolchain::default()
    };
    match toolchain.locate_compiler() {
        Some(path) => info!("LaTeX compiler: {}", path.display()),
        None => warn!(
            "{} not found; compilation will fail until a TeX distribution is installed",
            config.compiler
        ),
    }
    let engine = CompilationEngine::new(
        EngineConfig {
            toolchain,
            work_root: config.work_dir.clone(),
            timeout: config.compile_timeout,
            output_dir: config.output_dir.clone(),
        },
        cancel.clone(),
    );
    info!("Build workspace: {}", engine.workspace_dir().display());

    // Build app state
    let state = AppState {
        pipeline: Arc::new(Pipeline::new(
            generator,
            renderer,
            engine,
            cancel,
            PromptOverrides {
                system_prompt: config.system_prompt.clone(),
                system_prompt_fix: config.system_prompt_fix.clone(),
            },
        )),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
