//! Session use cases.
//!
//! Starting a case study, submitting decisions and reading back transcripts.
//! Each decision is stored before the advisor turn runs, so the transcript
//! always shows what the advisor was answering.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use casesim_domain::{
    ConversationHistory, DomainError, Message, Role, Session, SessionId, TranscriptRecord, UserId,
};

use crate::infrastructure::ports::{ClockPort, RepoError, SessionRepo, TranscriptRepo};
use crate::use_cases::turn::{
    DraftSink, PendingAdvisorMessage, TurnEngine, TurnError, TurnResult,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// A freshly created session and the outcome of its opening turn.
///
/// The session exists even when the opening turn was cancelled or could not
/// be stored.
#[derive(Debug)]
pub struct CaseStart {
    pub session: Session,
    pub opening: Result<TurnResult, TurnError>,
}

pub struct SessionOps {
    turn: Arc<TurnEngine>,
    sessions: Arc<dyn SessionRepo>,
    transcript: Arc<dyn TranscriptRepo>,
    clock: Arc<dyn ClockPort>,
}

impl SessionOps {
    pub fn new(
        turn: Arc<TurnEngine>,
        sessions: Arc<dyn SessionRepo>,
        transcript: Arc<dyn TranscriptRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            turn,
            sessions,
            transcript,
            clock,
        }
    }

    /// Create a session for `user_id` and run the opening advisor turn.
    pub async fn start_case(
        &self,
        user_id: &UserId,
        drafts: &dyn DraftSink,
        cancel: &CancellationToken,
    ) -> Result<CaseStart, SessionError> {
        let session = self.sessions.create_session(user_id).await?;
        tracing::info!(session_id = %session.id, user = %user_id, "Case started");

        let opening = self
            .turn
            .process_turn(&ConversationHistory::new(), session.id, drafts, cancel)
            .await;

        Ok(CaseStart { session, opening })
    }

    /// Store a user decision and run the advisor turn answering it.
    ///
    /// `history` is the finalized transcript before this decision. Blank
    /// input is rejected before anything is stored.
    pub async fn submit_decision(
        &self,
        session_id: SessionId,
        history: &ConversationHistory,
        input: &str,
        drafts: &dyn DraftSink,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, SessionError> {
        if input.trim().is_empty() {
            return Err(DomainError::validation("decision cannot be empty").into());
        }

        let record = TranscriptRecord::new(session_id, Role::User, input, self.clock.now());
        self.transcript.append(&record).await?;
        tracing::debug!(%session_id, message_id = %record.id, "Decision stored");

        let history = history.with(record.to_message());
        Ok(self
            .turn
            .process_turn(&history, session_id, drafts, cancel)
            .await?)
    }

    /// Store an advisor message left over from a failed append.
    ///
    /// Clears `pending` once stored. On failure the message stays in
    /// `pending` so it is never dropped; the model is not contacted either way.
    pub async fn flush_pending(
        &self,
        pending: &mut Option<PendingAdvisorMessage>,
    ) -> Result<Option<TurnResult>, SessionError> {
        let Some(message) = pending.take() else {
            return Ok(None);
        };
        match self.turn.retry_persist(message).await {
            Ok(result) => Ok(Some(result)),
            Err(TurnError::PersistenceFailed { pending: kept, source }) => {
                *pending = Some(kept);
                Err(source.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Finalized messages of a session in chronological order.
    pub async fn transcript(&self, session_id: SessionId) -> Result<Vec<Message>, SessionError> {
        let records = self.transcript.list_messages(session_id).await?;
        Ok(records.iter().map(TranscriptRecord::to_message).collect())
    }

    /// Sessions of a user, most recent first.
    pub async fn sessions(&self, user_id: &UserId) -> Result<Vec<Session>, SessionError> {
        Ok(self.sessions.list_sessions(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{
        LlmError, LlmRequest, MockLlmPort, MockSessionRepo, MockTranscriptRepo,
    };
    use crate::use_cases::turn::{NoDrafts, DEFAULT_BRANCH, OPENING_SCENARIO};
    use chrono::{TimeZone, Utc};
    use mockall::Sequence;
    use std::sync::Mutex;

    fn now() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("timestamp")
    }

    /// Model that is never reachable, so every turn ends on the simulator.
    fn offline_llm() -> MockLlmPort {
        let mut llm = MockLlmPort::new();
        llm.expect_stream()
            .returning(|_| Err(LlmError::Network("offline".into())));
        llm.expect_generate()
            .returning(|_| Err(LlmError::Network("offline".into())));
        llm
    }

    fn ops(
        llm: MockLlmPort,
        sessions: MockSessionRepo,
        transcript: Arc<dyn TranscriptRepo>,
    ) -> SessionOps {
        let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(now()));
        let turn = TurnEngine::new(Arc::new(llm), transcript.clone(), clock.clone());
        SessionOps::new(Arc::new(turn), Arc::new(sessions), transcript, clock)
    }

    fn capturing_transcript(store: Arc<Mutex<Vec<TranscriptRecord>>>) -> MockTranscriptRepo {
        let mut transcript = MockTranscriptRepo::new();
        transcript.expect_append().returning(move |record| {
            store.lock().expect("store lock").push(record.clone());
            Ok(())
        });
        transcript
    }

    #[tokio::test]
    async fn start_case_creates_session_and_opening_message() {
        let user = UserId::new("ceo");
        let session = Session {
            id: SessionId::new(),
            user_id: user.clone(),
            created_at: now(),
        };
        let created = session.clone();

        let mut sessions = MockSessionRepo::new();
        sessions
            .expect_create_session()
            .times(1)
            .returning(move |_| Ok(created.clone()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let ops = ops(
            offline_llm(),
            sessions,
            Arc::new(capturing_transcript(stored.clone())),
        );

        let start = ops
            .start_case(&user, &NoDrafts, &CancellationToken::new())
            .await
            .expect("start case");

        assert_eq!(start.session, session);
        let opening = start.opening.expect("opening turn");
        assert_eq!(opening.final_message.content, OPENING_SCENARIO);

        let stored = stored.lock().expect("store lock");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, session.id);
        assert_eq!(stored[0].role, Role::Advisor);
    }

    #[tokio::test]
    async fn blank_decision_is_rejected_without_side_effects() {
        let mut transcript = MockTranscriptRepo::new();
        transcript.expect_append().never();
        let mut llm = MockLlmPort::new();
        llm.expect_stream().never();
        llm.expect_generate().never();

        let ops = ops(llm, MockSessionRepo::new(), Arc::new(transcript));

        let result = ops
            .submit_decision(
                SessionId::new(),
                &ConversationHistory::new(),
                "   \n",
                &NoDrafts,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(SessionError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn decision_is_stored_before_advisor_reply() {
        let stored = Arc::new(Mutex::new(Vec::new()));
        let seen_requests: Arc<Mutex<Vec<LlmRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let mut llm = MockLlmPort::new();
        let seen = seen_requests.clone();
        llm.expect_stream().returning(move |request| {
            seen.lock().expect("seen lock").push(request);
            Err(LlmError::Network("offline".into()))
        });
        llm.expect_generate()
            .returning(|_| Err(LlmError::Network("offline".into())));

        let ops = ops(
            llm,
            MockSessionRepo::new(),
            Arc::new(capturing_transcript(stored.clone())),
        );
        let session_id = SessionId::new();
        let history: ConversationHistory = vec![Message::advisor(OPENING_SCENARIO)].into();

        let result = ops
            .submit_decision(
                session_id,
                &history,
                "B",
                &NoDrafts,
                &CancellationToken::new(),
            )
            .await
            .expect("turn");

        assert_eq!(result.final_message.content, DEFAULT_BRANCH);

        let stored = stored.lock().expect("store lock");
        let roles: Vec<_> = stored.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Advisor]);
        assert_eq!(stored[0].content, "B");

        let requests = seen_requests.lock().expect("seen lock");
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[1].content, "B");
    }

    #[tokio::test]
    async fn failed_decision_store_skips_turn() {
        let mut transcript = MockTranscriptRepo::new();
        transcript
            .expect_append()
            .times(1)
            .returning(|_| Err(RepoError::database("append", "disk full")));
        let mut llm = MockLlmPort::new();
        llm.expect_stream().never();
        llm.expect_generate().never();

        let ops = ops(llm, MockSessionRepo::new(), Arc::new(transcript));

        let result = ops
            .submit_decision(
                SessionId::new(),
                &ConversationHistory::new(),
                "A",
                &NoDrafts,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(SessionError::Repo(_))));
    }

    #[tokio::test]
    async fn unsaved_opening_is_kept_until_it_can_be_stored() {
        let user = UserId::new("ceo");
        let session = Session {
            id: SessionId::new(),
            user_id: user.clone(),
            created_at: now(),
        };
        let created = session.clone();
        let mut sessions = MockSessionRepo::new();
        sessions
            .expect_create_session()
            .returning(move |_| Ok(created.clone()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let mut transcript = MockTranscriptRepo::new();
        let mut seq = Sequence::new();
        transcript
            .expect_append()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(RepoError::database("append", "database is locked")));
        let sink = stored.clone();
        transcript
            .expect_append()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |record| {
                sink.lock().expect("store lock").push(record.clone());
                Ok(())
            });

        let ops = ops(offline_llm(), sessions, Arc::new(transcript));
        let start = ops
            .start_case(&user, &NoDrafts, &CancellationToken::new())
            .await
            .expect("session created");

        let mut pending = match start.opening {
            Err(TurnError::PersistenceFailed { pending, .. }) => Some(pending),
            other => panic!("unexpected opening: {other:?}"),
        };

        let failed = ops.flush_pending(&mut pending).await;
        assert!(matches!(failed, Err(SessionError::Repo(_))));
        assert!(pending.is_some(), "message kept after failed store");

        let flushed = ops
            .flush_pending(&mut pending)
            .await
            .expect("store recovers")
            .expect("message stored");
        assert!(pending.is_none());
        assert_eq!(flushed.final_message.content, OPENING_SCENARIO);

        let stored = stored.lock().expect("store lock");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, session.id);
        assert_eq!(stored[0].id, flushed.record_id);

        // Nothing left to store
        assert!(ops.flush_pending(&mut pending).await.expect("no-op").is_none());
    }

    #[tokio::test]
    async fn transcript_maps_records_to_messages() {
        let session_id = SessionId::new();
        let records = vec![
            TranscriptRecord::new(session_id, Role::Advisor, OPENING_SCENARIO, now()),
            TranscriptRecord::new(session_id, Role::User, "A", now()),
        ];

        let mut transcript = MockTranscriptRepo::new();
        transcript
            .expect_list_messages()
            .withf(move |id| *id == session_id)
            .returning(move |_| Ok(records.clone()));

        let ops = ops(MockLlmPort::new(), MockSessionRepo::new(), Arc::new(transcript));

        let messages = ops.transcript(session_id).await.expect("transcript");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Advisor);
        assert_eq!(messages[1].content, "A");
        assert_eq!(messages[1].created_at, Some(now()));
    }
}
