//! Interaction chunks: one persisted question/answer pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Category;

/// Maximum length of the question stored alongside a vector entry.
pub const MAX_QUESTION_METADATA_CHARS: usize = 500;

/// A question/answer pair as stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionChunk {
    pub id: String,
    pub session_id: String,
    pub category: Category,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl InteractionChunk {
    /// Text that gets embedded and returned as retrieval context.
    pub fn text(&self) -> String {
        compose_text(&self.question, &self.answer)
    }

    /// Question truncated for index metadata.
    pub fn question_summary(&self) -> String {
        self.question.chars().take(MAX_QUESTION_METADATA_CHARS).collect()
    }
}

/// Build the `Q: …\nA: …` form used for embedding.
pub fn compose_text(question: &str, answer: &str) -> String {
    format!("Q: {}\nA: {}", question, answer)
}
