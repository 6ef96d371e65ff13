//! Provider configuration storage and resolution.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::infrastructure::ports::{
    ClockPort, ProviderConfig, ProviderConfigPort, ProviderConfigRepo, RepoError,
};

const PROVIDER_SCOPE: &str = "provider";

/// SQLite implementation for provider settings storage.
pub struct SqliteProviderConfigRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteProviderConfigRepo {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("settings", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_settings (
                scope TEXT PRIMARY KEY NOT NULL,
                settings_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl ProviderConfigRepo for SqliteProviderConfigRepo {
    async fn get(&self) -> Result<Option<ProviderConfig>, RepoError> {
        let row = sqlx::query("SELECT settings_json FROM app_settings WHERE scope = ?")
            .bind(PROVIDER_SCOPE)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("settings", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("settings_json");
                let config = serde_json::from_str(&json).map_err(RepoError::serialization)?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, config: &ProviderConfig) -> Result<(), RepoError> {
        let json = serde_json::to_string(config).map_err(RepoError::serialization)?;
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO app_settings (scope, settings_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(PROVIDER_SCOPE)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(())
    }
}

/// Resolver backed by a [`ProviderConfigRepo`].
///
/// Reads the stored configuration on every call. When nothing is stored yet
/// (or the stored entry has no endpoint) it persists and returns the default
/// public endpoint with an empty key instead of waiting for the user.
pub struct StoredProviderConfig {
    repo: Arc<dyn ProviderConfigRepo>,
}

impl StoredProviderConfig {
    pub fn new(repo: Arc<dyn ProviderConfigRepo>) -> Self {
        Self { repo }
    }

    /// Replace the stored configuration (used by the settings surface).
    pub async fn update(&self, config: &ProviderConfig) -> Result<(), RepoError> {
        self.repo.save(config).await?;
        tracing::info!(base_url = %config.base_url, model = config.model(), "Provider configuration updated");
        Ok(())
    }
}

#[async_trait]
impl ProviderConfigPort for StoredProviderConfig {
    async fn resolve(&self) -> Option<ProviderConfig> {
        match self.repo.get().await {
            Ok(Some(config)) if !config.base_url.trim().is_empty() => return Some(config),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read provider configuration");
                return None;
            }
        }

        let init = ProviderConfig::default();
        if let Err(e) = self.repo.save(&init).await {
            // The default is still usable for this request
            tracing::warn!(error = %e, "Failed to persist default provider configuration");
        } else {
            tracing::info!(base_url = %init.base_url, "Initialized default provider configuration");
        }
        Some(init)
    }
}
