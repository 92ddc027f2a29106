//! Data models for specforge.
//!
//! Defines the investigation categories, the session aggregate with its
//! message log, emitted questions, and the interaction chunks that back
//! context retrieval.

mod category;
mod chunk;
mod question;
mod session;

pub use category::*;
pub use chunk::*;
pub use question::*;
pub use session::*;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Errors raised by model invariants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Message out of order: expected {expected} message")]
    OutOfOrder { expected: Role },
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
