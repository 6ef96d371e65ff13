//! Repository port traits for transcript and settings storage.

use async_trait::async_trait;

use casesim_domain::{Session, SessionId, TranscriptRecord, UserId};

use super::error::RepoError;
use super::types::ProviderConfig;

// =============================================================================
// Transcript Storage
// =============================================================================

/// Append-only ordered message log keyed by session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptRepo: Send + Sync {
    /// Append a record. Appending a record whose id is already stored is a
    /// no-op, so retries never duplicate a message.
    async fn append(&self, record: &TranscriptRecord) -> Result<(), RepoError>;

    /// Messages of a session in chronological (append) order.
    async fn list_messages(&self, session_id: SessionId)
        -> Result<Vec<TranscriptRecord>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create_session(&self, user_id: &UserId) -> Result<Session, RepoError>;

    /// Sessions of a user, most recent first.
    async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, RepoError>;
}

// =============================================================================
// Settings Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderConfigRepo: Send + Sync {
    async fn get(&self) -> Result<Option<ProviderConfig>, RepoError>;
    async fn save(&self, config: &ProviderConfig) -> Result<(), RepoError>;
}
