//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Model access (could swap the OpenAI-compatible client for another provider)
//! - Transcript and session storage (could swap SQLite -> hosted database)
//! - Provider configuration (stored settings, environment, UI)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;
pub mod types;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{ProviderConfigRepo, SessionRepo, TranscriptRepo};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ChatMessage, FinishReason, LlmPort, LlmRequest, LlmResponse, MessageRole,
    ProviderConfigPort, SnapshotStream, TokenUsage,
};

pub use types::{ProviderConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockLlmPort, MockProviderConfigPort};

#[cfg(test)]
pub use repos::{MockProviderConfigRepo, MockSessionRepo, MockTranscriptRepo};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{LlmError, RepoError};
