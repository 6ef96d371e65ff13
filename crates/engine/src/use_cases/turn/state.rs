//! Fallback chain of a single turn.
//!
//! `Streaming -> Completing -> Simulating -> Done`. Each attempt reports an
//! [`AttemptOutcome`]; [`TurnState::advance`] decides the next state. Only a
//! non-empty text counts as produced for the network attempts. The simulator
//! always ends the chain.

use std::fmt;

/// Which attempt produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Stream,
    Completion,
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Stream => "stream",
            ResponseSource::Completion => "completion",
            ResponseSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final text of a turn and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub source: ResponseSource,
}

impl Resolution {
    pub fn new(text: impl Into<String>, source: ResponseSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Produced(String),
    Unusable,
}

impl AttemptOutcome {
    /// Empty or missing text is unusable.
    pub fn from_text(text: Option<String>) -> Self {
        match text {
            Some(text) if !text.is_empty() => AttemptOutcome::Produced(text),
            _ => AttemptOutcome::Unusable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    Streaming,
    Completing,
    Simulating,
    Done(Resolution),
}

impl TurnState {
    pub fn advance(self, outcome: AttemptOutcome) -> TurnState {
        match (self, outcome) {
            (TurnState::Done(resolution), _) => TurnState::Done(resolution),

            (TurnState::Streaming, AttemptOutcome::Produced(text)) if !text.is_empty() => {
                TurnState::Done(Resolution::new(text, ResponseSource::Stream))
            }
            (TurnState::Streaming, _) => TurnState::Completing,

            (TurnState::Completing, AttemptOutcome::Produced(text)) if !text.is_empty() => {
                TurnState::Done(Resolution::new(text, ResponseSource::Completion))
            }
            (TurnState::Completing, _) => TurnState::Simulating,

            (TurnState::Simulating, AttemptOutcome::Produced(text)) => {
                TurnState::Done(Resolution::new(text, ResponseSource::Fallback))
            }
            (TurnState::Simulating, AttemptOutcome::Unusable) => {
                TurnState::Done(Resolution::new(String::new(), ResponseSource::Fallback))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TurnState::Done(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produced(text: &str) -> AttemptOutcome {
        AttemptOutcome::Produced(text.to_string())
    }

    #[test]
    fn test_stream_success_finishes_turn() {
        let next = TurnState::Streaming.advance(produced("Welcome"));
        assert_eq!(
            next,
            TurnState::Done(Resolution::new("Welcome", ResponseSource::Stream))
        );
    }

    #[test]
    fn test_unusable_stream_moves_to_completion() {
        assert_eq!(
            TurnState::Streaming.advance(AttemptOutcome::Unusable),
            TurnState::Completing
        );
        assert_eq!(
            TurnState::Streaming.advance(produced("")),
            TurnState::Completing
        );
    }

    #[test]
    fn test_failed_completion_moves_to_simulation() {
        assert_eq!(
            TurnState::Completing.advance(AttemptOutcome::Unusable),
            TurnState::Simulating
        );
        assert_eq!(
            TurnState::Completing.advance(produced("Board update")),
            TurnState::Done(Resolution::new("Board update", ResponseSource::Completion))
        );
    }

    #[test]
    fn test_simulation_always_terminates() {
        assert!(TurnState::Simulating.advance(produced("scripted")).is_done());
        assert!(TurnState::Simulating
            .advance(AttemptOutcome::Unusable)
            .is_done());
    }

    #[test]
    fn test_done_is_absorbing() {
        let done = TurnState::Done(Resolution::new("kept", ResponseSource::Stream));
        assert_eq!(done.clone().advance(produced("other")), done);
    }

    #[test]
    fn test_from_text_treats_empty_as_unusable() {
        assert_eq!(AttemptOutcome::from_text(None), AttemptOutcome::Unusable);
        assert_eq!(
            AttemptOutcome::from_text(Some(String::new())),
            AttemptOutcome::Unusable
        );
        assert_eq!(AttemptOutcome::from_text(Some("x".into())), produced("x"));
    }
}
