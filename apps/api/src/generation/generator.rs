//! Content Generation: selects the active backend, composes prompts and
//! normalizes results and errors.
//!
//! Flow: checkpoint → compose prompt → backend call (raced against
//! cancellation) → checkpoint → normalize.
//!
//! Hosted backends without a credential short-circuit to placeholder content so
//! an unconfigured installation still produces a document end to end.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::generation::prompts::{
    custom_fill_prompt, fix_prompt, resume_prompt, DEFAULT_CUSTOM_FILL_PROMPT,
    DEFAULT_FIX_PROMPT, DEFAULT_RESUME_PROMPT,
};
use crate::llm_client::{
    build_backend, http_client, BackendKind, CompletionBackend, Endpoints, LlmError,
};
use crate::models::resume::{CompletionResult, GenerationMode, GenerationRequest, ResumeContent};
use crate::pipeline::cancel::CancelFlag;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Cancelled")]
    Cancelled,

    #[error("AI provider error: {0}")]
    Failed(#[from] LlmError),
}

/// The currently configured backend. Replaced as a whole, never mutated.
struct ActiveBackend {
    kind: BackendKind,
    credential: String,
    model: String,
    backend: Arc<dyn CompletionBackend>,
}

impl ActiveBackend {
    fn is_unconfigured(&self) -> bool {
        self.credential.trim().is_empty() && !self.kind.is_local()
    }
}

/// Public view of the active configuration. Never exposes the credential.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSettings {
    pub provider: &'static str,
    pub model: String,
    pub api_key_configured: bool,
}

/// The system prompts built into the generator.
#[derive(Debug, Clone, Serialize)]
pub struct DefaultPrompts {
    pub resume: &'static str,
    pub fix: &'static str,
    pub custom_fill: &'static str,
}

pub const DEFAULT_PROMPTS: DefaultPrompts = DefaultPrompts {
    resume: DEFAULT_RESUME_PROMPT,
    fix: DEFAULT_FIX_PROMPT,
    custom_fill: DEFAULT_CUSTOM_FILL_PROMPT,
};

pub struct ContentGenerator {
    client: Client,
    endpoints: Endpoints,
    active: RwLock<Arc<ActiveBackend>>,
    cancel: CancelFlag,
}

impl ContentGenerator {
    pub fn new(
        kind: BackendKind,
        credential: &str,
        model: &str,
        endpoints: Endpoints,
        cancel: CancelFlag,
    ) -> Result<Self, LlmError> {
        let client = http_client()?;
        let active = Arc::new(ActiveBackend {
            kind,
            credential: credential.to_string(),
            model: model.to_string(),
            backend: build_backend(kind, client.clone(), credential, model, &endpoints),
        });

        Ok(Self {
            client,
            endpoints,
            active: RwLock::new(active),
            cancel,
        })
    }

    /// Atomically replaces the active backend. Calls already in flight keep the
    /// backend they started with.
    pub fn configure(&self, kind: BackendKind, credential: &str, model: &str) {
        let next = Arc::new(ActiveBackend {
            kind,
            credential: credential.to_string(),
            model: model.to_string(),
            backend: build_backend(kind, self.client.clone(), credential, model, &self.endpoints),
        });

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!("LLM backend configured: provider={kind}, model={model}");
    }

    pub fn settings(&self) -> BackendSettings {
        let active = self.snapshot();
        BackendSettings {
            provider: active.kind.as_str(),
            model: active.model.clone(),
            api_key_configured: !active.credential.trim().is_empty(),
        }
    }

    /// Dispatches on the request mode; the result variant always matches it.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<CompletionResult, GenerationError> {
        let override_prompt = request.system_prompt_override.as_deref();
        match &request.mode {
            GenerationMode::Structured => self
                .generate_structured_content(
                    &request.job_description,
                    &request.user_data,
                    override_prompt,
                )
                .await
                .map(CompletionResult::Structured),
            GenerationMode::TemplateFill { template_text } => self
                .fill_template_directly(
                    template_text,
                    &request.job_description,
                    &request.user_data,
                    override_prompt,
                )
                .await
                .map(CompletionResult::Text),
        }
    }

    pub async fn generate_structured_content(
        &self,
        job_description: &str,
        user_data: &Value,
        system_prompt_override: Option<&str>,
    ) -> Result<ResumeContent, GenerationError> {
        self.checkpoint()?;
        let active = self.snapshot();

        if active.is_unconfigured() {
            warn!(
                "No API key configured for provider {}; returning placeholder content",
                active.kind
            );
            return Ok(ResumeContent::placeholder());
        }

        let prompt = resume_prompt(job_description, &user_data.to_string());
        let system = resolve_system(system_prompt_override, DEFAULT_RESUME_PROMPT);

        info!(
            "Generating structured content via {} ({})",
            active.kind, active.model
        );
        let value = self
            .guarded(active.backend.complete_structured(system, &prompt))
            .await?;

        // serde also accepts a sequence for a struct, filling fields by position.
        if !value.is_object() {
            return Err(GenerationError::Failed(LlmError::MalformedResponse(
                "expected a JSON object for resume content".to_string(),
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| GenerationError::Failed(LlmError::MalformedResponse(e.to_string())))
    }

    pub async fn fix_source(
        &self,
        source_text: &str,
        error_log: &str,
        system_prompt_override: Option<&str>,
    ) -> Result<String, GenerationError> {
        let active = self.snapshot();
        let prompt = fix_prompt(source_text, error_log);
        let system = resolve_system(system_prompt_override, DEFAULT_FIX_PROMPT);

        info!("Requesting source fix via {} ({})", active.kind, active.model);
        self.guarded(active.backend.complete_text(system, &prompt))
            .await
    }

    pub async fn fill_template_directly(
        &self,
        template_text: &str,
        job_description: &str,
        user_data: &Value,
        system_prompt_override: Option<&str>,
    ) -> Result<String, GenerationError> {
        let active = self.snapshot();
        let prompt = custom_fill_prompt(job_description, &user_data.to_string(), template_text);
        let system = resolve_system(system_prompt_override, DEFAULT_CUSTOM_FILL_PROMPT);

        info!(
            "Filling custom template via {} ({})",
            active.kind, active.model
        );
        self.guarded(active.backend.complete_text(system, &prompt))
            .await
    }

    fn snapshot(&self) -> Arc<ActiveBackend> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn checkpoint(&self) -> Result<(), GenerationError> {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        Ok(())
    }

    /// Runs one backend call between two cancellation checkpoints. The call is
    /// dropped (and its request aborted) as soon as cancellation is requested.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, LlmError>>,
    ) -> Result<T, GenerationError> {
        self.checkpoint()?;
        let result = tokio::select! {
            result = call => result,
            _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
        };
        self.checkpoint()?;
        Ok(result?)
    }
}

/// Blank overrides count as unset.
fn resolve_system<'a>(system_prompt_override: Option<&'a str>, default: &'a str) -> &'a str {
    system_prompt_override
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
