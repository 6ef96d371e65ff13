//! Application state and composition.

use std::sync::Arc;

use casesim_domain::UserId;

use crate::infrastructure::{
    clock::SystemClock,
    config::EngineConfig,
    openai::OpenAiClient,
    ports::{ClockPort, LlmPort, ProviderConfigPort, RepoError, SessionRepo, TranscriptRepo},
    provider_config::{SqliteProviderConfigRepo, StoredProviderConfig},
    resilient_llm::ResilientLlmClient,
    transcript::SqliteTranscriptRepo,
};
use crate::use_cases::{SessionOps, TurnEngine};

/// Main application state.
///
/// Holds the session use cases and the provider settings surface.
pub struct App {
    pub user: UserId,
    pub sessions: Arc<SessionOps>,
    pub provider: Arc<StoredProviderConfig>,
}

impl App {
    /// Wire already-built adapters together.
    pub fn new(
        user: UserId,
        llm: Arc<dyn LlmPort>,
        sessions: Arc<dyn SessionRepo>,
        transcript: Arc<dyn TranscriptRepo>,
        provider: Arc<StoredProviderConfig>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let turn = Arc::new(TurnEngine::new(llm, transcript.clone(), clock.clone()));
        let session_ops = Arc::new(SessionOps::new(turn, sessions, transcript, clock));

        Self {
            user,
            sessions: session_ops,
            provider,
        }
    }

    /// Open storage named by `config` and build the production object graph.
    ///
    /// Provider settings given in the environment overwrite the stored ones.
    pub async fn connect(config: &EngineConfig) -> Result<Self, RepoError> {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

        let transcript_repo = Arc::new(SqliteTranscriptRepo::new(&config.db_path, clock.clone()).await?);
        let provider_repo =
            Arc::new(SqliteProviderConfigRepo::new(&config.db_path, clock.clone()).await?);
        let provider = Arc::new(StoredProviderConfig::new(provider_repo));

        if let Some(seed) = &config.provider_seed {
            provider.update(seed).await?;
        }

        let resolver: Arc<dyn ProviderConfigPort> = provider.clone();
        let openai = Arc::new(OpenAiClient::with_timeout(resolver, config.llm_timeout_secs));
        tracing::info!(
            max_retries = config.retry.max_retries,
            base_delay_ms = config.retry.base_delay_ms,
            timeout_secs = config.llm_timeout_secs,
            "LLM client configured"
        );
        let llm: Arc<dyn LlmPort> = Arc::new(ResilientLlmClient::new(openai, config.retry.clone()));

        Ok(Self::new(
            UserId::new(config.user.clone()),
            llm,
            transcript_repo.clone(),
            transcript_repo,
            provider,
            clock,
        ))
    }
}
