//! SQLite-backed session and transcript storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use casesim_domain::{MessageId, Role, Session, SessionId, TranscriptRecord, UserId};

use crate::infrastructure::ports::{ClockPort, RepoError, SessionRepo, TranscriptRepo};

/// SQLite implementation of the append-only transcript log.
pub struct SqliteTranscriptRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteTranscriptRepo {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("transcript", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("transcript", e))?;

        // seq gives a total append order independent of clock resolution
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("transcript", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages (session_id, seq)",
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("transcript", e))?;

        Ok(Self { pool, clock })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(value).map_err(RepoError::serialization)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(RepoError::serialization)
}

fn record_from_row(row: &SqliteRow) -> Result<TranscriptRecord, RepoError> {
    let id: String = row.get("id");
    let session_id: String = row.get("session_id");
    let role: String = row.get("role");
    let content: String = row.get("content");
    let created_at: String = row.get("created_at");

    Ok(TranscriptRecord {
        id: MessageId::from_uuid(parse_uuid(&id)?),
        session_id: SessionId::from_uuid(parse_uuid(&session_id)?),
        role: role.parse::<Role>().map_err(RepoError::serialization)?,
        content,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<Session, RepoError> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let created_at: String = row.get("created_at");

    Ok(Session {
        id: SessionId::from_uuid(parse_uuid(&id)?),
        user_id: UserId::new(user_id),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl TranscriptRepo for SqliteTranscriptRepo {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.session_id.to_string())
        .bind(record.role.as_str())
        .bind(&record.content)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("append", e))?;

        if result.rows_affected() == 0 {
            tracing::debug!(message_id = %record.id, "Transcript record already stored");
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TranscriptRecord>, RepoError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM chat_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_messages", e))?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl SessionRepo for SqliteTranscriptRepo {
    async fn create_session(&self, user_id: &UserId) -> Result<Session, RepoError> {
        let session = Session {
            id: SessionId::new(),
            user_id: user_id.clone(),
            created_at: self.clock.now(),
        };

        sqlx::query("INSERT INTO game_sessions (id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(session.id.to_string())
            .bind(session.user_id.as_str())
            .bind(session.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("create_session", e))?;

        Ok(session)
    }

    async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<Session>, RepoError> {
        let rows = sqlx::query(
            "SELECT id, user_id, created_at FROM game_sessions WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_sessions", e))?;

        rows.iter().map(session_from_row).collect()
    }
}
