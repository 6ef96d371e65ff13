//! In-memory transcript view with a single replaceable draft.
//!
//! The view owns the ordered finalized messages of a session plus at most
//! one draft. The draft always renders after every final message and is
//! replaced wholesale on each update; promoting it discards the draft and
//! appends the final advisor message.

use crate::message::{ConversationHistory, Message};

/// One renderable row of a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptEntry<'a> {
    Final(&'a Message),
    Draft(&'a str),
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptView {
    messages: Vec<Message>,
    draft: Option<String>,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a view from already persisted messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            draft: None,
        }
    }

    /// Append a finalized message. Any pending draft is dropped first so the
    /// draft can never end up ahead of a final message.
    pub fn push(&mut self, message: Message) {
        self.draft = None;
        self.messages.push(message);
    }

    /// Replace the draft content. Returns the previous draft, if any.
    pub fn set_draft(&mut self, content: impl Into<String>) -> Option<String> {
        self.draft.replace(content.into())
    }

    pub fn clear_draft(&mut self) -> Option<String> {
        self.draft.take()
    }

    /// Replace the draft with the finalized advisor message.
    pub fn promote(&mut self, final_message: Message) {
        self.push(final_message);
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn entries(&self) -> impl Iterator<Item = TranscriptEntry<'_>> {
        self.messages
            .iter()
            .map(TranscriptEntry::Final)
            .chain(self.draft.as_deref().map(TranscriptEntry::Draft))
    }

    /// History for the next turn, without the draft.
    pub fn history(&self) -> ConversationHistory {
        self.messages.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_is_replaced_not_appended() {
        let mut view = TranscriptView::new();
        view.push(Message::user("A"));

        assert_eq!(view.set_draft("You"), None);
        assert_eq!(view.set_draft("You launched"), Some("You".to_string()));

        let drafts: Vec<_> = view
            .entries()
            .filter(|e| matches!(e, TranscriptEntry::Draft(_)))
            .collect();
        assert_eq!(drafts, vec![TranscriptEntry::Draft("You launched")]);
    }

    #[test]
    fn test_draft_is_always_last_entry() {
        let mut view = TranscriptView::from_messages(vec![Message::advisor("Welcome")]);
        view.set_draft("partial");
        view.push(Message::user("late"));

        assert_eq!(view.draft(), None);
        assert!(matches!(view.entries().last(), Some(TranscriptEntry::Final(_))));
    }

    #[test]
    fn test_promote_replaces_draft_with_final() {
        let mut view = TranscriptView::new();
        view.set_draft("Partial...");
        view.promote(Message::advisor("Partial... done"));

        assert_eq!(view.draft(), None);
        assert_eq!(view.messages().len(), 1);
        assert_eq!(view.messages()[0].content, "Partial... done");
    }

    #[test]
    fn test_history_excludes_draft() {
        let mut view = TranscriptView::new();
        view.push(Message::advisor("Welcome"));
        view.push(Message::user("B"));
        view.set_draft("Interesting");

        let history = view.history();
        assert_eq!(history.len(), 2);
        assert!(history.messages().iter().all(|m| m.content != "Interesting"));
    }
}
