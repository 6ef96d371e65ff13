//! Use cases - User story orchestration.
//!
//! `turn` produces and stores one advisor message per turn; `session` wraps
//! it with case creation, decision submission and read-side helpers.

pub mod session;
pub mod turn;

pub use session::{CaseStart, SessionError, SessionOps};
pub use turn::{DraftSink, NoDrafts, TurnEngine, TurnError, TurnResult};
