//! Session aggregate and message log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Category, Error, Question, Result};

/// Message metadata keys.
pub mod meta {
    pub const IS_FOLLOWUP: &str = "is_followup";
    pub const QUESTION_ID: &str = "question_id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const EDITED: &str = "edited";
    pub const EDITED_AT: &str = "edited_at";
    pub const SKIPPED: &str = "skipped";
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Assistant,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Assistant => f.write_str("assistant"),
            Role::User => f.write_str("user"),
        }
    }
}

/// One entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    /// Assistant message carrying an emitted question.
    pub fn from_question(question: &Question) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(meta::IS_FOLLOWUP.to_string(), Value::Bool(question.is_followup));
        metadata.insert(
            meta::QUESTION_ID.to_string(),
            Value::String(question.id.clone()),
        );

        Self {
            id: crate::new_id(),
            role: Role::Assistant,
            content: question.text.clone(),
            category: question.category,
            timestamp: question.timestamp,
            metadata,
        }
    }

    /// User answer message.
    pub fn answer(category: Category, content: impl Into<String>) -> Self {
        Self {
            id: crate::new_id(),
            role: Role::User,
            content: content.into(),
            category,
            timestamp: crate::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_followup(&self) -> bool {
        self.flag(meta::IS_FOLLOWUP)
    }

    pub fn is_skipped(&self) -> bool {
        self.flag(meta::SKIPPED)
    }

    pub fn is_edited(&self) -> bool {
        self.flag(meta::EDITED)
    }

    /// Interaction chunk backing this answer, if it was persisted.
    pub fn chunk_id(&self) -> Option<&str> {
        self.metadata.get(meta::CHUNK_ID).and_then(Value::as_str)
    }
}

/// Session bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Completed pair count at the most recent checkpoint.
    #[serde(default)]
    pub last_checkpoint: usize,
}

/// Aggregate root for one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: Category,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub skipped_questions: BTreeSet<Category>,
    pub metadata: SessionMetadata,
}

impl Session {
    /// A fresh session in the `Start` state.
    pub fn new(id: impl Into<String>) -> Self {
        let now = crate::now();
        Self {
            id: id.into(),
            state: Category::Start,
            messages: Vec::new(),
            skipped_questions: BTreeSet::new(),
            metadata: SessionMetadata {
                created_at: now,
                updated_at: now,
                last_checkpoint: 0,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Role the next appended message must have.
    pub fn expected_role(&self) -> Role {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => Role::User,
            _ => Role::Assistant,
        }
    }

    /// Append a message, keeping strict assistant/user alternation.
    pub fn push_message(&mut self, message: Message) -> Result<()> {
        let expected = self.expected_role();
        if message.role != expected {
            return Err(Error::OutOfOrder { expected });
        }
        self.messages.push(message);
        self.touch();
        Ok(())
    }

    /// Number of question/answer pairs that have been answered.
    pub fn completed_pairs(&self) -> usize {
        self.messages.len().saturating_sub(1) / 2
    }

    /// The most recent question, if it is still awaiting an answer.
    pub fn pending_question(&self) -> Option<&Message> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant)
    }

    pub fn find_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn find_message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Real (non-skipped) answers recorded for a category.
    pub fn answers_in(&self, category: Category) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User && m.category == category && !m.is_skipped())
            .count()
    }

    /// Per-category progress in `0.0..=1.0`.
    ///
    /// Categories behind the current state or skipped count as done. The
    /// current category is half done once it has an answer.
    pub fn progress(&self) -> BTreeMap<Category, f64> {
        Category::INVESTIGATED
            .iter()
            .map(|&category| {
                let value = if category < self.state || self.skipped_questions.contains(&category)
                {
                    1.0
                } else if category == self.state && self.answers_in(category) > 0 {
                    0.5
                } else {
                    0.0
                };
                (category, value)
            })
            .collect()
    }

    pub fn touch(&mut self) {
        self.metadata.updated_at = crate::now();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            state: self.state,
            message_count: self.messages.len(),
            is_complete: self.is_complete(),
            created_at: self.metadata.created_at,
            updated_at: self.metadata.updated_at,
        }
    }
}

/// Lightweight view of a saved session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: Category,
    pub message_count: usize,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(category: Category) -> Message {
        Message::from_question(&Question::category(category, "What?"))
    }

    #[test]
    fn test_alternation_enforced() {
        let mut session = Session::new("s1");

        let err = session
            .push_message(Message::answer(Category::Functionality, "hi"))
            .unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { expected: Role::Assistant }));

        session.push_message(question(Category::Functionality)).unwrap();
        assert!(session.push_message(question(Category::Functionality)).is_err());
        session
            .push_message(Message::answer(Category::Functionality, "an answer"))
            .unwrap();
        assert_eq!(session.expected_role(), Role::Assistant);
    }

    #[test]
    fn test_completed_pairs() {
        let mut session = Session::new("s1");
        assert_eq!(session.completed_pairs(), 0);

        session.push_message(question(Category::Functionality)).unwrap();
        assert_eq!(session.completed_pairs(), 0);

        session
            .push_message(Message::answer(Category::Functionality, "a"))
            .unwrap();
        session.push_message(question(Category::Users)).unwrap();
        assert_eq!(session.completed_pairs(), 1);
    }

    #[test]
    fn test_progress_fractions() {
        let mut session = Session::new("s1");
        session.state = Category::Design;
        session.skipped_questions.insert(Category::Market);
        session.push_message(question(Category::Design)).unwrap();
        session
            .push_message(Message::answer(Category::Design, "minimal"))
            .unwrap();

        let progress = session.progress();
        assert_eq!(progress[&Category::Functionality], 1.0);
        assert_eq!(progress[&Category::Demographics], 1.0);
        assert_eq!(progress[&Category::Design], 0.5);
        assert_eq!(progress[&Category::Market], 1.0);
        assert_eq!(progress[&Category::Technical], 0.0);
        assert!(!progress.contains_key(&Category::Start));
    }

    #[test]
    fn test_skipped_answers_not_counted() {
        let mut session = Session::new("s1");
        session.push_message(question(Category::Users)).unwrap();
        session
            .push_message(
                Message::answer(Category::Users, "[skipped]").with_metadata(meta::SKIPPED, true),
            )
            .unwrap();
        assert_eq!(session.answers_in(Category::Users), 0);
    }

    #[test]
    fn test_session_json_roundtrip_keeps_state() {
        let mut session = Session::new("s1");
        session.state = Category::Market;
        session.skipped_questions.insert(Category::Design);
        session.push_message(question(Category::Market)).unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.state, Category::Market);
        assert!(restored.skipped_questions.contains(&Category::Design));
        assert_eq!(restored.messages.len(), 1);
        assert!(!restored.messages[0].is_followup());
    }
}
