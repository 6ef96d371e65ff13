//! Messages and conversation history.
//!
//! Only two roles exist here: the user and the advisor. The in-progress
//! advisor draft is not a `Message` at all (see [`crate::transcript`]), so a
//! `ConversationHistory` can never carry one to a model client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Author of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Advisor,
}

impl Role {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Advisor => "advisor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            // "ai" is how early transcripts labelled advisor turns
            "advisor" | "ai" => Ok(Role::Advisor),
            other => Err(DomainError::parse(format!("Unknown role: {}", other))),
        }
    }
}

/// A finalized message in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn advisor(content: impl Into<String>) -> Self {
        Self {
            role: Role::Advisor,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Chronologically ordered messages sent to model clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<Message>);

impl ConversationHistory {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    /// Returns a copy of this history with `message` appended.
    pub fn with(&self, message: Message) -> Self {
        let mut next = self.clone();
        next.push(message);
        next
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.0.iter().rev().find(|m| m.is_user())
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

impl FromIterator<Message> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
