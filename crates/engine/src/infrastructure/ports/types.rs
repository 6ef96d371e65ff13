//! Helper types for port operations.

use serde::{Deserialize, Serialize};

/// Public OpenAI-compatible endpoint used until the user configures one.
pub const DEFAULT_BASE_URL: &str = "https://llmfoundry.straive.com/openai/v1";

/// Small default model; providers may alias it.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Where and how to reach the chat-completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Chat-completion URL, tolerant of a trailing slash on the base URL.
    pub fn completions_url(&self) -> String {
        let base = if self.base_url.trim().is_empty() {
            DEFAULT_BASE_URL
        } else {
            self.base_url.trim()
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, "")
    }
}
