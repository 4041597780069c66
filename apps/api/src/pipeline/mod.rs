//! Pipeline Coordinator: sequences generation, rendering and compilation,
//! exposes cancellation, and remembers the last artifact for retrieval.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compile::{CompilationEngine, CompilationOutcome, CompileError, CompiledArtifact};
use crate::generation::{ContentGenerator, GenerationError};
use crate::llm_client::BackendKind;
use crate::models::resume::{CompletionResult, GenerationMode, GenerationRequest};
use crate::render::{TemplateError, TemplateRenderer, TemplateSource};

pub mod cancel;

use cancel::CancelFlag;

/// Template name that selects direct filling of caller-supplied template text.
pub const CUSTOM_TEMPLATE: &str = "custom";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid User Data JSON")]
    InvalidUserData(#[source] serde_json::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Generation(GenerationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Compile(CompileError),
}

impl From<GenerationError> for PipelineError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Generation(other),
        }
    }
}

impl From<CompileError> for PipelineError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Compile(other),
        }
    }
}

/// Caller input for producing LaTeX source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRequest {
    #[serde(default)]
    pub job_description: String,
    pub template_name: String,
    /// JSON text; blank means an empty object.
    #[serde(default)]
    pub user_data: String,
    #[serde(default)]
    pub custom_template_content: Option<String>,
}

/// System prompt overrides. `None` or blank means the built-in prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOverrides {
    pub system_prompt: Option<String>,
    pub system_prompt_fix: Option<String>,
}

/// Replacement backend configuration and prompt overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub system_prompt_fix: Option<String>,
}

pub struct Pipeline {
    generator: ContentGenerator,
    renderer: TemplateRenderer,
    engine: CompilationEngine,
    cancel: CancelFlag,
    prompts: RwLock<PromptOverrides>,
    last_artifact: Mutex<Option<PathBuf>>,
}

impl Pipeline {
    /// `generator` and `engine` must observe `cancel`.
    pub fn new(
        generator: ContentGenerator,
        renderer: TemplateRenderer,
        engine: CompilationEngine,
        cancel: CancelFlag,
        prompts: PromptOverrides,
    ) -> Self {
        Self {
            generator,
            renderer,
            engine,
            cancel,
            prompts: RwLock::new(prompts),
            last_artifact: Mutex::new(None),
        }
    }

    pub fn generator(&self) -> &ContentGenerator {
        &self.generator
    }

    /// Produces LaTeX source for a job description, either by filling a named
    /// template with structured content or by having the model fill custom
    /// template text directly.
    pub async fn generate_source(&self, request: SourceRequest) -> Result<String, PipelineError> {
        self.cancel.reset();

        let user_data = parse_user_data(&request.user_data)?;
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mode = match request.custom_template_content {
            Some(text) if request.template_name == CUSTOM_TEMPLATE && !text.trim().is_empty() => {
                GenerationMode::TemplateFill {
                    template_text: text,
                }
            }
            _ => GenerationMode::Structured,
        };

        let generation = GenerationRequest {
            job_description: request.job_description,
            user_data,
            mode,
            system_prompt_override: self.prompts().system_prompt,
        };

        match self.generator.generate(&generation).await? {
            CompletionResult::Text(source) => Ok(source),
            CompletionResult::Structured(content) => {
                if self.cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                let source = self
                    .renderer
                    .render(TemplateSource::Named(&request.template_name), &content)
                    .await?;
                info!("Rendered template '{}'", request.template_name);
                Ok(source)
            }
        }
    }

    /// Renders caller-supplied template text against caller-supplied content,
    /// without calling the model.
    pub async fn render_template(
        &self,
        template_text: &str,
        context: &Value,
    ) -> Result<String, PipelineError> {
        self.cancel.reset();
        Ok(self
            .renderer
            .render(TemplateSource::Inline(template_text), context)
            .await?)
    }

    /// Asks the model to repair `source` given the compiler's diagnostics.
    pub async fn fix(&self, source: &str, error_log: &str) -> Result<String, PipelineError> {
        self.cancel.reset();
        let override_prompt = self.prompts().system_prompt_fix;
        Ok(self
            .generator
            .fix_source(source, error_log, override_prompt.as_deref())
            .await?)
    }

    /// Compiles `source` and records the artifact path for [`Pipeline::last_artifact`].
    pub async fn compile(&self, source: &str) -> Result<CompiledArtifact, PipelineError> {
        self.cancel.reset();
        let result = self.engine.compile(source).await;
        debug!(outcome = ?CompilationOutcome::from_result(&result), "Compilation finished");
        let artifact = result?;
        *self
            .last_artifact
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(artifact.pdf_path.clone());
        Ok(artifact)
    }

    /// Sets the cancellation flag and kills the live compiler. Returns whether
    /// a compiler process was running.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel();
        let killed = self.engine.kill_compilation();
        info!(killed, "Cancellation requested");
        killed
    }

    /// Path of the most recent artifact, if it still exists on disk.
    pub async fn last_artifact(&self) -> Option<PathBuf> {
        let path = self
            .last_artifact
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    pub fn prompts(&self) -> PromptOverrides {
        self.prompts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps the backend and prompt overrides. In-memory only.
    pub fn update_settings(&self, update: SettingsUpdate) {
        let kind = BackendKind::from_setting(&update.provider);
        self.generator.configure(kind, &update.api_key, &update.model);
        *self.prompts.write().unwrap_or_else(PoisonError::into_inner) = PromptOverrides {
            system_prompt: update.system_prompt,
            system_prompt_fix: update.system_prompt_fix,
        };
    }
}

fn parse_user_data(raw: &str) -> Result<Value, PipelineError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| {
        warn!("Rejected user data: {e}");
        PipelineError::InvalidUserData(e)
    })
}
