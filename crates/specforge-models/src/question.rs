//! Questions emitted by the investigation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Category;

/// A question put to the user. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub category: Category,
    pub is_followup: bool,
    pub timestamp: DateTime<Utc>,
}

impl Question {
    /// A question that opens or continues a category.
    pub fn category(category: Category, text: impl Into<String>) -> Self {
        Self::build(category, text.into(), false)
    }

    /// A clarifying question that stays in the current category.
    pub fn followup(category: Category, text: impl Into<String>) -> Self {
        Self::build(category, text.into(), true)
    }

    fn build(category: Category, text: String, is_followup: bool) -> Self {
        Self {
            id: crate::new_id(),
            text,
            category,
            is_followup,
            timestamp: crate::now(),
        }
    }
}
