//! casesim domain types.
//!
//! Messages, the draft-aware transcript view, sessions and persisted
//! transcript records. No I/O lives here.

pub mod error;
pub mod ids;
pub mod message;
pub mod session;
pub mod transcript;

pub use error::DomainError;
pub use ids::{MessageId, SessionId, UserId};
pub use message::{ConversationHistory, Message, Role};
pub use session::{Session, TranscriptRecord};
pub use transcript::{TranscriptEntry, TranscriptView};
