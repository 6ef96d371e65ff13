//! Retrying wrapper around a model client.
//!
//! Transient failures of the single-response completion (network, rate
//! limiting, garbled responses) are retried with capped exponential backoff
//! and jitter. Streams pass straight through: the completion is already the
//! fallback for a failed stream, so retrying the stream would only delay it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse, SnapshotStream};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in both directions (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), without jitter.
    fn backoff_ms(&self, retry: u32) -> u64 {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    fn delay(&self, retry: u32) -> Duration {
        let backoff = self.backoff_ms(retry);
        let spread = (backoff as f64 * self.jitter_factor) as i64;
        if spread <= 0 {
            return Duration::from_millis(backoff);
        }
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((backoff as i64 + jitter).max(0) as u64)
    }
}

/// Credentials and malformed requests fail the same way every time.
fn is_transient(error: &LlmError) -> bool {
    !matches!(error, LlmError::Unauthorized(_) | LlmError::Rejected(_))
}

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    config: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T, LlmError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;
        loop {
            let error = match attempt().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::info!(operation, attempt = retry + 1, "LLM request recovered");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !is_transient(&error) {
                tracing::warn!(
                    operation,
                    kind = error.kind(),
                    error = %error,
                    "LLM request failed, not retrying"
                );
                return Err(error);
            }
            if retry >= self.config.max_retries {
                tracing::warn!(
                    operation,
                    attempts = retry + 1,
                    kind = error.kind(),
                    error = %error,
                    "LLM request failed, retries exhausted"
                );
                return Err(error);
            }

            retry += 1;
            let delay = self.config.delay(retry);
            tracing::warn!(
                operation,
                attempt = retry,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                kind = error.kind(),
                error = %error,
                "LLM request failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.with_retry("generate", || {
            let inner = Arc::clone(&self.inner);
            let request = request.clone();
            async move { inner.generate(request).await }
        })
        .await
    }

    async fn stream(&self, request: LlmRequest) -> Result<SnapshotStream, LlmError> {
        self.inner.stream(request).await
    }
}
