//! Process configuration read from the environment.

use crate::infrastructure::openai::DEFAULT_TIMEOUT_SECS;
use crate::infrastructure::ports::{ProviderConfig, DEFAULT_BASE_URL};
use crate::infrastructure::resilient_llm::RetryConfig;

pub const DEFAULT_DB_PATH: &str = "casesim.db";
pub const DEFAULT_USER: &str = "local";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite file holding transcripts and provider settings
    pub db_path: String,
    /// User the terminal sessions belong to
    pub user: String,
    pub llm_timeout_secs: u64,
    pub retry: RetryConfig,
    /// Provider settings to seed into storage at startup, if any were given
    pub provider_seed: Option<ProviderConfig>,
}

impl EngineConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("CASESIM_DB").unwrap_or_else(|| DEFAULT_DB_PATH.into());
        let user = lookup("CASESIM_USER")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER.into());
        let llm_timeout_secs = lookup("LLM_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut retry = RetryConfig::default();
        if let Some(max_retries) = lookup("LLM_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            retry.max_retries = max_retries;
        }

        let base_url = lookup("LLM_BASE_URL");
        let api_key = lookup("LLM_API_KEY");
        let model = lookup("LLM_MODEL");
        let provider_seed = if base_url.is_some() || api_key.is_some() || model.is_some() {
            let mut seed = ProviderConfig::new(
                base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
                api_key.unwrap_or_default(),
            );
            seed.model = model;
            Some(seed)
        } else {
            None
        };

        Self {
            db_path,
            user,
            llm_timeout_secs,
            retry,
            provider_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.user, DEFAULT_USER);
        assert_eq!(config.llm_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.provider_seed.is_none());
    }

    #[test]
    fn test_provider_seed_from_partial_settings() {
        let config = config_from(&[("LLM_API_KEY", "sk-test"), ("LLM_MAX_RETRIES", "0")]);
        let seed = config.provider_seed.expect("seed");
        assert_eq!(seed.base_url, DEFAULT_BASE_URL);
        assert_eq!(seed.api_key, "sk-test");
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config_from(&[("LLM_TIMEOUT_SECS", "soon")]);
        assert_eq!(config.llm_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
