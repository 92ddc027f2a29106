//! Service layer for specforge.
//!
//! - Interactions (transcript + vector index dual writes)
//! - Retriever (session-scoped, recency-weighted context)
//! - Questions (template and model-generated questions)
//! - Checkpoint (automatic session snapshots)
//! - Synthesizer (transcript to technical brief)
//! - Conversation (the investigation state machine tying it together)

pub mod checkpoint;
mod conversation;
mod interactions;
pub mod questions;
pub mod retriever;
pub mod synthesizer;

pub use conversation::{
    word_count, AnswerOutcome, Collaborators, InvestigationService, SessionStatus,
    StartedSession, Transition, SKIPPED_ANSWER,
};
pub use interactions::InteractionStore;
pub use questions::{QuestionSelector, QuestionTemplates, ADAPTATION_RULES};
pub use retriever::{ContextRetriever, RetrievalConfig};
pub use synthesizer::{PromptSynthesizer, SynthesisOptions, SynthesizedPrompt};
