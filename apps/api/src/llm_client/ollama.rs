//! Local inference backend: Ollama `/api/generate`. No credential required.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{check_status, parse_json_payload, CompletionBackend, LlmError};

pub const DEFAULT_API_BASE: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaBackend {
    client: Client,
    model: String,
    api_base: String,
}

impl OllamaBackend {
    pub fn new(client: Client, model: String, api_base: String) -> Self {
        Self {
            client,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            system,
            prompt,
            stream: false,
            format: json_mode.then_some("json"),
        };

        debug!(model = %self.model, json_mode, "dispatching ollama generate");

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&request)
            .send()
            .await?;

        let body: GenerateResponse = check_status(response).await?.json().await?;
        Ok(body.response)
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete_text(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.call(system, prompt, false).await
    }

    async fn complete_structured(&self, system: &str, prompt: &str) -> Result<Value, LlmError> {
        let content = self.call(system, prompt, true).await?;
        parse_json_payload(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> OllamaBackend {
        OllamaBackend::new(Client::new(), "llama3".to_string(), server.uri())
    }

    #[tokio::test]
    async fn test_text_mode_disables_streaming_without_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "system": "sys",
                "prompt": "fix this",
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "fixed", "done": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = backend(&server).complete_text("sys", "fix this").await.unwrap();
        assert_eq!(text, "fixed");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("format").is_none());
    }

    #[tokio::test]
    async fn test_structured_mode_sets_json_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"format": "json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "```json\n{\"summary\": \"Systems engineer\"}\n```"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let value = backend(&server)
            .complete_structured("sys", "p")
            .await
            .unwrap();
        assert_eq!(value["summary"], "Systems engineer");
    }

    #[tokio::test]
    async fn test_not_found_model_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "model 'llama3' not found"})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).complete_text("sys", "p").await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
