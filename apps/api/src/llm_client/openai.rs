//! Primary hosted backend: OpenAI-compatible Chat Completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{check_status, parse_json_payload, CompletionBackend, LlmError};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl OpenAiBackend {
    pub fn new(client: Client, api_key: String, model: String, api_base: String) -> Self {
        Self {
            client,
            api_key,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, json_mode, "dispatching chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let body: ChatResponse = check_status(response).await?.json().await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
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
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> OpenAiBackend {
        OpenAiBackend::new(
            Client::new(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            server.uri(),
        )
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_complete_text_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(chat_reply("\\documentclass{article}"))
            .expect(1)
            .mount(&server)
            .await;

        let text = backend(&server).complete_text("sys", "hello").await.unwrap();
        assert_eq!(text, "\\documentclass{article}");
    }

    #[tokio::test]
    async fn test_complete_structured_requests_json_object_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(chat_reply(r#"{"name": "Ada Lovelace", "skills": ["Rust"]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let value = backend(&server)
            .complete_structured("sys", "prompt")
            .await
            .unwrap();
        assert_eq!(value["name"], "Ada Lovelace");
        assert_eq!(value["skills"][0], "Rust");
    }

    #[tokio::test]
    async fn test_complete_structured_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply("not json at all"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete_structured("sys", "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server).complete_text("sys", "p").await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend(&server).complete_text("sys", "p").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }
}
