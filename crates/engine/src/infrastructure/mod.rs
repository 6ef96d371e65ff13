//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod config;
pub mod openai;
pub mod ports;
pub mod provider_config;
pub mod resilient_llm;
pub mod sse;
pub mod transcript;
