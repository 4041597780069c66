//! LLM Client: the capability contract every completion backend implements.
//!
//! ARCHITECTURAL RULE: No other module may call a vendor API directly.
//! All LLM interactions go through a `CompletionBackend` built here.
//!
//! Backends are stateless beyond their static config (credential, model, endpoint)
//! and make exactly one outbound call per invocation. There is no retry here:
//! retry policy belongs to the callers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod prompts;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Timeout for a single completion request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("LLM returned empty content")]
    EmptyContent,
}

// ────────────────────────────────────────────────────────────────────────────
// Backend selection
// ────────────────────────────────────────────────────────────────────────────

/// The closed set of supported backends.
///
/// `OpenAi` is the primary hosted API, `Gemini` the secondary hosted API and
/// `Ollama` the local inference server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenAi,
    Gemini,
    Ollama,
}

impl BackendKind {
    /// Parses a provider name from settings.
    ///
    /// Unknown names fall back to `OpenAi` rather than failing. This keeps
    /// half-configured installations usable in demo mode; it is deliberately
    /// not extended to any other setting.
    pub fn from_setting(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => BackendKind::OpenAi,
            "google" | "gemini" => BackendKind::Gemini,
            "ollama" => BackendKind::Ollama,
            other => {
                warn!("Unknown LLM provider '{other}', falling back to openai");
                BackendKind::OpenAi
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "google",
            BackendKind::Ollama => "ollama",
        }
    }

    /// Local inference needs no credential.
    pub fn is_local(&self) -> bool {
        matches!(self, BackendKind::Ollama)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs for each backend. Overridable for self-hosted gateways and tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub openai: String,
    pub gemini: String,
    pub ollama: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai: openai::DEFAULT_API_BASE.to_string(),
            gemini: gemini::DEFAULT_API_BASE.to_string(),
            ollama: ollama::DEFAULT_API_BASE.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Capability contract
// ────────────────────────────────────────────────────────────────────────────

/// Uniform completion contract. Call sites never know which vendor they talk to.
///
/// Carried by the generator as `Arc<dyn CompletionBackend>`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Free-text completion.
    async fn complete_text(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    /// JSON completion. Backends with a native JSON mode override this; the
    /// default asks for JSON in the system prompt and parses the reply.
    async fn complete_structured(&self, system: &str, prompt: &str) -> Result<Value, LlmError> {
        let system = format!("{system}\n\n{}", prompts::JSON_ONLY_SYSTEM);
        let text = self.complete_text(&system, prompt).await?;
        parse_json_payload(&text)
    }
}

/// Builds the backend for `kind`. All backends share one HTTP client.
pub fn build_backend(
    kind: BackendKind,
    client: Client,
    credential: &str,
    model: &str,
    endpoints: &Endpoints,
) -> Arc<dyn CompletionBackend> {
    match kind {
        BackendKind::OpenAi => Arc::new(OpenAiBackend::new(
            client,
            credential.to_string(),
            model.to_string(),
            endpoints.openai.clone(),
        )),
        BackendKind::Gemini => Arc::new(GeminiBackend::new(
            client,
            credential.to_string(),
            model.to_string(),
            endpoints.gemini.clone(),
        )),
        BackendKind::Ollama => Arc::new(OllamaBackend::new(
            client,
            model.to_string(),
            endpoints.ollama.clone(),
        )),
    }
}

/// Builds the shared HTTP client used by every backend.
pub fn http_client() -> Result<Client, LlmError> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

// ────────────────────────────────────────────────────────────────────────────
// Shared response handling
// ────────────────────────────────────────────────────────────────────────────

/// Turns a non-2xx response into `LlmError::Api`, passing 2xx through.
pub(crate) async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("LLM API returned {}: {}", status, body);
    Err(LlmError::Api {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

/// Vendors nest the human-readable message under `error.message` (or `error`).
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    match value.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(error) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        None => body.to_string(),
    }
}

/// Parses a model reply as JSON, tolerating markdown code fences.
pub fn parse_json_payload(text: &str) -> Result<Value, LlmError> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(text).map_err(|e| LlmError::MalformedResponse(e.to_string()))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
