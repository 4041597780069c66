//! Secondary hosted backend: Google Gemini `generateContent` REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{check_status, parse_json_payload, CompletionBackend, LlmError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiBackend {
    pub fn new(client: Client, api_key: String, model: String, api_base: String) -> Self {
        Self {
            client,
            api_key,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part { text: system }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: prompt }],
            }],
            generation_config: json_mode.then_some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };

        debug!(model = %self.model, json_mode, "dispatching gemini generateContent");

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.api_base, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let body: GenerateResponse = check_status(response).await?.json().await?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete_text(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.call(system, prompt, false).await
    }

    async fn complete_structured(&self, system: &str, prompt: &str) -> Result<Value, LlmError> {
        let content = self.call(system, prompt, true).await?;
        parse_json_payload(&content)
    }
}
