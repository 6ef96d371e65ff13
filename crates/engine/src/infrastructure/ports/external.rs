//! External service port traits (model provider, provider configuration).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use casesim_domain::{ConversationHistory, Role};

use super::error::LlmError;
use super::types::ProviderConfig;

// =============================================================================
// Model Requests
// =============================================================================

/// What a model client sends: the finalized conversation plus an optional
/// system prompt that clients put in front of it.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
        }
    }

    /// Map a conversation history onto the client-facing binary role set.
    pub fn from_history(history: &ConversationHistory) -> Self {
        let messages = history
            .messages()
            .iter()
            .map(|m| match m.role {
                Role::User => ChatMessage::user(m.content.clone()),
                Role::Advisor => ChatMessage::assistant(m.content.clone()),
            })
            .collect();
        Self::new(messages)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Roles a model ever sees for conversation turns. The system prompt travels
/// separately in [`LlmRequest::system_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

// =============================================================================
// Model Responses
// =============================================================================

/// Result of a single-response completion.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Cut off by the provider's token limit
    Length,
    ContentFilter,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Cumulative text snapshots from a streamed completion.
///
/// Every `Ok` item is the whole response so far, never a delta. A transport
/// or protocol failure is surfaced as a single `Err` item, after which the
/// stream ends.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Single request/response completion.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Open a fresh streaming completion.
    async fn stream(&self, request: LlmRequest) -> Result<SnapshotStream, LlmError>;
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Source of the provider endpoint and credentials.
///
/// Implementations must read current state on every call and must never wait
/// on user interaction. `None` means no configuration could be produced;
/// callers then proceed with [`ProviderConfig::default`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderConfigPort: Send + Sync {
    async fn resolve(&self) -> Option<ProviderConfig>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesim_domain::Message;

    #[test]
    fn test_from_history_maps_advisor_to_assistant() {
        let history: ConversationHistory = vec![
            Message::advisor("Welcome, CEO."),
            Message::user("A"),
        ]
        .into();

        let request = LlmRequest::from_history(&history);
        assert_eq!(
            request.messages,
            vec![
                ChatMessage::assistant("Welcome, CEO."),
                ChatMessage::user("A"),
            ]
        );
        assert!(request.system_prompt.is_none());
    }
}
