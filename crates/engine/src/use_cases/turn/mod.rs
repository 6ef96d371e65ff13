//! Advisor turn processing.
//!
//! A turn streams a completion and publishes every non-empty cumulative
//! snapshot as a draft, falls back to a single-response completion when the
//! stream produced nothing, then to the scripted simulator, and finally
//! appends exactly one advisor message to the session transcript.
//!
//! Callers must not run two turns for the same session concurrently; the
//! engine does not lock per session and transcript ordering relies on it.

mod fallback;
mod state;


use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use casesim_domain::{ConversationHistory, Message, MessageId, Role, SessionId, TranscriptRecord};

use crate::infrastructure::ports::{
    ClockPort, FinishReason, LlmPort, LlmRequest, RepoError, TranscriptRepo,
};

pub use fallback::{FallbackSimulator, DEFAULT_BRANCH, MARKETING_BRANCH, OPENING_SCENARIO};
pub use state::{AttemptOutcome, Resolution, ResponseSource, TurnState};

pub const SYSTEM_PROMPT: &str = "You are a strategy simulation engine.
1. Present a business case study problem to the user.
2. The user is the CEO/Manager.
3. Wait for their decision.
4. Evaluate their decision and move the simulation forward (time passes, consequences happen).
5. Keep it concise.";

/// Receiver of in-progress advisor text.
///
/// `draft` is called with each cumulative snapshot in receipt order; every
/// call replaces the previous draft. `clear` is called once the turn has a
/// final text, before it is persisted.
pub trait DraftSink: Send + Sync {
    fn draft(&self, content: &str);

    fn clear(&self) {}
}

impl<F> DraftSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn draft(&self, content: &str) {
        self(content)
    }
}

/// Sink for callers that only want the final message.
pub struct NoDrafts;

impl DraftSink for NoDrafts {
    fn draft(&self, _content: &str) {}
}

/// Outcome of a persisted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    pub final_message: Message,
    pub used_fallback: bool,
    pub source: ResponseSource,
    pub record_id: MessageId,
}

/// A finalized advisor message whose append has not succeeded yet.
///
/// Holds the record with its id, so re-appending it can never create a
/// second advisor message for the same turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAdvisorMessage {
    record: TranscriptRecord,
    source: ResponseSource,
}

impl PendingAdvisorMessage {
    fn new(record: TranscriptRecord, source: ResponseSource) -> Self {
        Self { record, source }
    }

    pub fn session_id(&self) -> SessionId {
        self.record.session_id
    }

    pub fn message(&self) -> Message {
        self.record.to_message()
    }

    pub fn into_result(self) -> TurnResult {
        TurnResult {
            final_message: self.record.to_message(),
            used_fallback: self.source == ResponseSource::Fallback,
            source: self.source,
            record_id: self.record.id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Turn cancelled")]
    Cancelled,

    /// The final message exists but was not durably stored. Retry with
    /// [`TurnEngine::retry_persist`]; do not re-run the turn.
    #[error("Advisor message could not be persisted: {source}")]
    PersistenceFailed {
        pending: PendingAdvisorMessage,
        source: RepoError,
    },
}

impl TurnError {
    /// The advisor message to display even though persistence failed.
    pub fn final_message(&self) -> Option<Message> {
        match self {
            TurnError::PersistenceFailed { pending, .. } => Some(pending.message()),
            TurnError::Cancelled => None,
        }
    }
}

pub struct TurnEngine {
    llm: Arc<dyn LlmPort>,
    transcript: Arc<dyn TranscriptRepo>,
    clock: Arc<dyn ClockPort>,
    simulator: FallbackSimulator,
    system_prompt: String,
}

impl TurnEngine {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        transcript: Arc<dyn TranscriptRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            llm,
            transcript,
            clock,
            simulator: FallbackSimulator::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run one advisor turn for `history` and append the result to the
    /// session transcript.
    ///
    /// # Returns
    /// * `Ok(TurnResult)` - exactly one advisor message was appended
    /// * `Err(TurnError::PersistenceFailed)` - final text computed, append failed
    /// * `Err(TurnError::Cancelled)` - nothing was appended
    pub async fn process_turn(
        &self,
        history: &ConversationHistory,
        session_id: SessionId,
        drafts: &dyn DraftSink,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        let request =
            LlmRequest::from_history(history).with_system_prompt(self.system_prompt.clone());

        let resolution = self.resolve(history, request, drafts, cancel).await?;
        drafts.clear();

        if cancel.is_cancelled() {
            tracing::info!(%session_id, "Turn cancelled before persistence");
            return Err(TurnError::Cancelled);
        }

        tracing::info!(
            %session_id,
            source = %resolution.source,
            chars = resolution.text.len(),
            "Advisor turn resolved"
        );

        let record =
            TranscriptRecord::new(session_id, Role::Advisor, resolution.text, self.clock.now());
        self.persist(PendingAdvisorMessage::new(record, resolution.source))
            .await
    }

    /// Re-attempt persistence of an already computed advisor message.
    ///
    /// Never contacts the model.
    pub async fn retry_persist(
        &self,
        pending: PendingAdvisorMessage,
    ) -> Result<TurnResult, TurnError> {
        tracing::info!(session_id = %pending.session_id(), "Retrying advisor message persistence");
        self.persist(pending).await
    }

    async fn persist(&self, pending: PendingAdvisorMessage) -> Result<TurnResult, TurnError> {
        match self.transcript.append(&pending.record).await {
            Ok(()) => {
                tracing::debug!(
                    session_id = %pending.record.session_id,
                    message_id = %pending.record.id,
                    "Advisor message persisted"
                );
                Ok(pending.into_result())
            }
            Err(source) => {
                tracing::error!(
                    session_id = %pending.record.session_id,
                    message_id = %pending.record.id,
                    error = %source,
                    "Failed to persist advisor message"
                );
                Err(TurnError::PersistenceFailed { pending, source })
            }
        }
    }

    async fn resolve(
        &self,
        history: &ConversationHistory,
        request: LlmRequest,
        drafts: &dyn DraftSink,
        cancel: &CancellationToken,
    ) -> Result<Resolution, TurnError> {
        let mut state = TurnState::Streaming;
        loop {
            state = match state {
                TurnState::Done(resolution) => return Ok(resolution),
                TurnState::Streaming => {
                    let outcome = self.stream_attempt(request.clone(), drafts, cancel).await?;
                    TurnState::Streaming.advance(outcome)
                }
                TurnState::Completing => {
                    let outcome = self.completion_attempt(request.clone(), cancel).await?;
                    TurnState::Completing.advance(outcome)
                }
                TurnState::Simulating => {
                    tracing::warn!("Model unavailable, using scripted fallback");
                    let scripted = self.simulator.simulate(history);
                    TurnState::Simulating.advance(AttemptOutcome::Produced(scripted))
                }
            };
        }
    }

    async fn stream_attempt(
        &self,
        request: LlmRequest,
        drafts: &dyn DraftSink,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, TurnError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            opened = self.llm.stream(request) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Stream unusable, could not open");
                return Ok(AttemptOutcome::Unusable);
            }
        };

        let mut last_snapshot: Option<String> = None;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                item = stream.next() => item,
            };

            match item {
                Some(Ok(snapshot)) => {
                    if snapshot.is_empty() {
                        continue;
                    }
                    drafts.draft(&snapshot);
                    last_snapshot = Some(snapshot);
                }
                Some(Err(e)) => {
                    if last_snapshot.is_some() {
                        tracing::warn!(
                            kind = e.kind(),
                            error = %e,
                            "Stream failed after partial content, keeping last snapshot"
                        );
                    } else {
                        tracing::warn!(
                            kind = e.kind(),
                            error = %e,
                            "Stream unusable, failed before content"
                        );
                    }
                    break;
                }
                None => {
                    if last_snapshot.is_none() {
                        tracing::warn!("Stream unusable, ended without content");
                    }
                    break;
                }
            }
        }

        Ok(AttemptOutcome::from_text(last_snapshot))
    }

    async fn completion_attempt(
        &self,
        request: LlmRequest,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, TurnError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            result = self.llm.generate(request) => result,
        };

        match result {
            Ok(response) => {
                if response.content.is_empty() {
                    tracing::warn!("Completion failed, empty content");
                } else if response.finish_reason == FinishReason::Length {
                    tracing::warn!("Completion truncated by provider token limit");
                }
                if let Some(usage) = response.usage {
                    tracing::debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Completion token usage"
                    );
                }
                Ok(AttemptOutcome::from_text(Some(response.content)))
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Completion failed");
                Ok(AttemptOutcome::Unusable)
            }
        }
    }
}
