//! OpenAI-compatible chat-completion client.
//!
//! Serves both the single-response completion and the streamed completion.
//! The provider configuration is resolved fresh on every request so that
//! endpoint or key changes between turns take effect immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    FinishReason, LlmError, LlmPort, LlmRequest, LlmResponse, ProviderConfig,
    ProviderConfigPort, SnapshotStream, TokenUsage,
};
use crate::infrastructure::sse::snapshot_stream;

/// Default request timeout; completions can be slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: Arc<dyn ProviderConfigPort>,
}

impl OpenAiClient {
    pub fn new(config: Arc<dyn ProviderConfigPort>) -> Self {
        Self::with_timeout(config, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(config: Arc<dyn ProviderConfigPort>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    async fn current_config(&self) -> ProviderConfig {
        match self.config.resolve().await {
            Some(config) => config,
            None => {
                tracing::warn!(
                    "Provider configuration absent, using default endpoint without credentials"
                );
                ProviderConfig::default()
            }
        }
    }

    async fn send(&self, request: &LlmRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let config = self.current_config().await;
        let api_request = OpenAIChatRequest {
            model: config.model().to_string(),
            messages: build_messages(request),
            stream,
        };

        let mut builder = self.client.post(config.completions_url()).json(&api_request);
        if config.has_credentials() {
            builder = builder.bearer_auth(&config.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmPort for OpenAiClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let response = self.send(&request, false).await?;

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        convert_response(api_response)
    }

    async fn stream(&self, request: LlmRequest) -> Result<SnapshotStream, LlmError> {
        let response = self.send(&request, true).await?;
        Ok(snapshot_stream(response.bytes_stream()))
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    let detail = format!("{}: {}", status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(detail),
        s if s.is_client_error() => LlmError::Rejected(detail),
        _ => LlmError::Network(detail),
    }
}

fn build_messages(request: &LlmRequest) -> Vec<OpenAIMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system_prompt {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }

    for msg in &request.messages {
        messages.push(OpenAIMessage {
            role: msg.role.as_wire_str().to_string(),
            content: Some(msg.content.clone()),
        });
    }

    messages
}

fn convert_response(response: OpenAIChatResponse) -> Result<LlmResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in LLM response".to_string()))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Unknown,
        None => FinishReason::Stop,
    };

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        finish_reason,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::ChatMessage;

    #[test]
    fn test_system_prompt_leads_messages() {
        let request = LlmRequest::new(vec![ChatMessage::user("A"), ChatMessage::assistant("ok")])
            .with_system_prompt("You are a strategy simulation engine.");

        let messages = build_messages(&request);
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[test]
    fn test_request_body_shape() {
        let body = OpenAIChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: build_messages(&LlmRequest::new(vec![ChatMessage::user("hi")])),
            stream: true,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}],
            })
        );
    }

    #[test]
    fn test_convert_response_reads_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Welcome"},"finish_reason":"stop"}],
                      "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#;
        let parsed: OpenAIChatResponse = serde_json::from_str(raw).expect("parse");

        let response = convert_response(parsed).expect("convert");
        assert_eq!(response.content, "Welcome");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(4));
    }

    #[test]
    fn test_convert_response_without_choices_is_invalid() {
        let parsed: OpenAIChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(matches!(
            convert_response(parsed),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            LlmError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            LlmError::Rejected(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream".to_string()),
            LlmError::Network(msg) if msg == "502: upstream"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = ProviderConfig::new("http://127.0.0.1:9/v1", "");
        let mut resolver = crate::infrastructure::ports::MockProviderConfigPort::new();
        resolver
            .expect_resolve()
            .returning(move || Some(config.clone()));
        let client = OpenAiClient::with_timeout(Arc::new(resolver), 2);

        let result = client.generate(LlmRequest::new(vec![ChatMessage::user("A")])).await;
        assert!(matches!(result, Err(LlmError::Network(_))));
    }
}
