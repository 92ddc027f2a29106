//! Investigation service.
//!
//! Owns the session state machine and orchestrates the interaction store,
//! context retriever, question selector and synthesizer for every answer.
//! Each session sits behind its own async mutex so overlapping calls for
//! the same id run one after another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use specforge_embeddings::EmbeddingProvider;
use specforge_llm::CompletionProvider;
use specforge_models::{meta, new_id, Category, Message, Question, Role, Session, SessionSummary};
use specforge_storage::{SessionStore, TranscriptStore};
use specforge_vectors::VectorIndex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::checkpoint;
use super::interactions::InteractionStore;
use super::questions::QuestionSelector;
use super::retriever::{ContextRetriever, RetrievalConfig};
use super::synthesizer::{PromptSynthesizer, SynthesisOptions, SynthesizedPrompt};
use crate::config::InvestigationConfig;
use crate::error::{Error, Result};

/// Placeholder content recorded for a skipped question.
pub const SKIPPED_ANSWER: &str = "[skipped]";

/// What happens after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stay in the category and ask a clarifying question.
    FollowUp(Category),
    /// Move to the next category.
    Advance(Category),
    /// No categories left.
    Complete,
}

impl Transition {
    pub fn decide(state: Category, word_count: usize, threshold: usize) -> Self {
        if state.is_terminal() {
            return Transition::Complete;
        }
        if word_count < threshold && state.is_investigated() {
            return Transition::FollowUp(state);
        }
        match state.next() {
            Category::Complete => Transition::Complete,
            next => Transition::Advance(next),
        }
    }
}

/// Whitespace-separated tokens in an answer.
pub fn word_count(answer: &str) -> usize {
    answer.split_whitespace().count()
}

/// Result of starting an investigation.
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: String,
    pub question: Question,
}

/// Result of an answer or a skip.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Question { question: Question },
    Complete { prompt: SynthesizedPrompt },
}

/// Snapshot of where a session stands.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: Category,
    pub progress: BTreeMap<Category, f64>,
    pub message_count: usize,
    pub edited_answers: usize,
    pub is_complete: bool,
    pub skipped: Vec<Category>,
}

impl SessionStatus {
    fn of(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            state: session.state,
            progress: session.progress(),
            message_count: session.messages.len(),
            edited_answers: session.messages.iter().filter(|m| m.is_edited()).count(),
            is_complete: session.is_complete(),
            skipped: session.skipped_questions.iter().copied().collect(),
        }
    }
}

/// Shared collaborators, constructed once per process.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub completion: Arc<dyn CompletionProvider>,
}

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone)]
pub struct InvestigationService {
    inner: Arc<InvestigationServiceInner>,
}

struct InvestigationServiceInner {
    interactions: InteractionStore,
    retriever: ContextRetriever,
    selector: QuestionSelector,
    synthesizer: PromptSynthesizer,
    store: Arc<dyn SessionStore>,
    active: RwLock<HashMap<String, SessionHandle>>,
    config: InvestigationConfig,
}

impl InvestigationService {
    pub fn new(collaborators: Collaborators, config: InvestigationConfig) -> Self {
        let interactions = InteractionStore::new(
            collaborators.embedder,
            collaborators.index,
            collaborators.transcripts,
        );
        let retriever = ContextRetriever::new(interactions.clone(), RetrievalConfig::from(&config));
        let selector = QuestionSelector::new(collaborators.completion, config.retry, config.temperature);

        Self::with_selector(interactions, retriever, selector, collaborators.sessions, config)
    }

    /// Assemble from prebuilt parts, e.g. a selector with custom templates.
    pub fn with_selector(
        interactions: InteractionStore,
        retriever: ContextRetriever,
        selector: QuestionSelector,
        store: Arc<dyn SessionStore>,
        config: InvestigationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(InvestigationServiceInner {
                interactions,
                retriever,
                selector,
                synthesizer: PromptSynthesizer::new(config.prompt_token_budget),
                store,
                active: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &InvestigationConfig {
        &self.inner.config
    }

    /// Sessions currently held in memory.
    pub async fn active_count(&self) -> usize {
        self.inner.active.read().await.len()
    }

    // ========================================================================
    // Session lookup
    // ========================================================================

    async fn handle(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.inner.active.read().await.get(session_id) {
            return Ok(handle.clone());
        }

        let session = self.load_from_store(session_id).await?;
        let mut active = self.inner.active.write().await;
        let handle = active
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();

        Ok(handle)
    }

    async fn load_from_store(&self, session_id: &str) -> Result<Session> {
        match self.inner.store.load(session_id).await {
            Ok(Some(session)) => {
                debug!(session_id = %session_id, "Restored session from store");
                Ok(session)
            }
            Ok(None) | Err(specforge_storage::Error::InvalidInput(_)) => {
                Err(Error::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate_answer(&self, answer: &str) -> Result<()> {
        if answer.trim().is_empty() {
            return Err(Error::Validation("Answer cannot be empty".to_string()));
        }
        let max = self.inner.config.max_answer_chars;
        if answer.chars().count() > max {
            return Err(Error::Validation(format!(
                "Answer exceeds {} characters",
                max
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Core flow
    // ========================================================================

    /// Create a session and return its opening question.
    pub async fn start_session(&self) -> Result<StartedSession> {
        let question = self.inner.selector.initial_question().await?;

        let mut session = Session::new(new_id());
        session.state = question.category;
        session.push_message(Message::from_question(&question))?;

        let session_id = session.id.clone();
        self.inner
            .active
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));

        info!(session_id = %session_id, "Started investigation");

        Ok(StartedSession {
            session_id,
            question,
        })
    }

    /// Record an answer and produce the next question or the final prompt.
    pub async fn submit_answer(&self, session_id: &str, answer: &str) -> Result<AnswerOutcome> {
        self.validate_answer(answer)?;

        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;

        if session.is_complete() {
            debug!(session_id = %session_id, "Answer for completed session");
            let prompt = self.synthesize_locked(&session, &SynthesisOptions::default()).await?;
            return Ok(AnswerOutcome::Complete { prompt });
        }

        let question_text = pending_question_text(&session)?;
        let category = session.state;

        let (chunk, context) = tokio::join!(
            self.inner
                .interactions
                .persist(session_id, category, &question_text, answer),
            self.inner.retriever.retrieve(answer, session_id),
        );
        let chunk = chunk?;

        let words = word_count(answer);
        let transition = Transition::decide(category, words, self.inner.config.followup_word_threshold);

        let generated = match context {
            Ok(context) => self
                .question_after(transition, answer, &context, &session.messages)
                .await
                .map(|question| (question, context.len())),
            Err(e) => Err(e),
        };
        let (next_question, context_chunks) = match generated {
            Ok(generated) => generated,
            Err(e) => {
                self.discard_chunk(session_id, &chunk.id).await;
                return Err(e);
            }
        };

        session.push_message(
            Message::answer(category, answer).with_metadata(meta::CHUNK_ID, chunk.id.clone()),
        )?;

        info!(
            session_id = %session_id,
            category = %category,
            words,
            transition = ?transition,
            context_chunks,
            "Processed answer"
        );

        match next_question {
            Some(question) => {
                session.state = question.category;
                session.push_message(Message::from_question(&question))?;
                self.checkpoint(&mut session).await;
                Ok(AnswerOutcome::Question { question })
            }
            None => {
                session.state = Category::Complete;
                self.finish(&mut session).await?;
                let prompt = self.synthesize_locked(&session, &SynthesisOptions::default()).await?;
                Ok(AnswerOutcome::Complete { prompt })
            }
        }
    }

    /// Question that follows an answer, `None` once the investigation is over.
    async fn question_after(
        &self,
        transition: Transition,
        answer: &str,
        context: &[String],
        messages: &[Message],
    ) -> Result<Option<Question>> {
        let question = match transition {
            Transition::FollowUp(current) => {
                self.inner
                    .selector
                    .followup_question(current, answer, context, messages)
                    .await?
            }
            Transition::Advance(next) => {
                self.inner
                    .selector
                    .category_question(next, context, messages)
                    .await?
            }
            Transition::Complete => return Ok(None),
        };
        Ok(Some(question))
    }

    /// Drop an interaction whose answer never made it into the session.
    async fn discard_chunk(&self, session_id: &str, chunk_id: &str) {
        match self.inner.interactions.delete_chunk(session_id, chunk_id).await {
            Ok(_) => debug!(session_id = %session_id, chunk_id = %chunk_id, "Discarded unanswered interaction"),
            Err(e) => warn!(
                session_id = %session_id,
                chunk_id = %chunk_id,
                error = %e,
                "Failed to discard interaction"
            ),
        }
    }

    pub async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(SessionStatus::of(&session))
    }

    // ========================================================================
    // Skip / edit / history
    // ========================================================================

    /// Skip the current category and move on.
    pub async fn skip_question(&self, session_id: &str) -> Result<AnswerOutcome> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;

        if session.is_complete() {
            return Err(Error::Validation("Investigation is already complete".to_string()));
        }

        let question_text = pending_question_text(&session)?;
        let category = session.state;
        let next = category.next();

        let next_question = if next.is_terminal() {
            None
        } else {
            let context = self.inner.retriever.retrieve(&question_text, session_id).await?;
            Some(
                self.inner
                    .selector
                    .category_question(next, &context, &session.messages)
                    .await?,
            )
        };

        session.skipped_questions.insert(category);
        session.push_message(
            Message::answer(category, SKIPPED_ANSWER).with_metadata(meta::SKIPPED, true),
        )?;

        info!(session_id = %session_id, category = %category, "Skipped category");

        match next_question {
            Some(question) => {
                session.state = question.category;
                session.push_message(Message::from_question(&question))?;
                self.checkpoint(&mut session).await;
                Ok(AnswerOutcome::Question { question })
            }
            None => {
                session.state = Category::Complete;
                self.finish(&mut session).await?;
                let prompt = self.synthesize_locked(&session, &SynthesisOptions::default()).await?;
                Ok(AnswerOutcome::Complete { prompt })
            }
        }
    }

    /// Replace a previous answer. Later questions are left as they were.
    pub async fn edit_answer(
        &self,
        session_id: &str,
        message_id: &str,
        new_answer: &str,
    ) -> Result<Message> {
        self.validate_answer(new_answer)?;

        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;

        let message = session
            .find_message(message_id)
            .ok_or_else(|| Error::Validation(format!("Unknown message: {}", message_id)))?;
        if message.role != Role::User {
            return Err(Error::Validation("Only answers can be edited".to_string()));
        }
        if message.is_skipped() {
            return Err(Error::Validation(
                "Skipped questions have no answer to edit".to_string(),
            ));
        }
        let chunk_id = message
            .chunk_id()
            .ok_or_else(|| Error::Validation(format!("Message {} has no stored interaction", message_id)))?
            .to_string();

        self.inner
            .interactions
            .update_interaction(session_id, &chunk_id, new_answer)
            .await?;

        let updated = {
            let message = session
                .find_message_mut(message_id)
                .ok_or_else(|| Error::Internal(format!("Message {} vanished", message_id)))?;
            message.content = new_answer.to_string();
            message
                .metadata
                .insert(meta::EDITED.to_string(), serde_json::Value::Bool(true));
            message.metadata.insert(
                meta::EDITED_AT.to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
            message.clone()
        };
        session.touch();

        info!(session_id = %session_id, message_id = %message_id, "Edited answer");

        Ok(updated)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.messages.clone())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save when a checkpoint boundary was crossed. Failures are logged.
    async fn checkpoint(&self, session: &mut Session) {
        let previous = session.metadata.last_checkpoint;
        if !checkpoint::mark_if_due(session, self.inner.config.checkpoint_interval) {
            return;
        }

        match self.inner.store.save(session).await {
            Ok(()) => info!(
                session_id = %session.id,
                completed_pairs = session.metadata.last_checkpoint,
                "Checkpointed session"
            ),
            Err(e) => {
                session.metadata.last_checkpoint = previous;
                warn!(session_id = %session.id, error = %e, "Checkpoint failed");
            }
        }
    }

    /// Completed sessions are always saved.
    async fn finish(&self, session: &mut Session) -> Result<()> {
        checkpoint::mark_if_due(session, self.inner.config.checkpoint_interval);
        self.inner.store.save(session).await?;
        info!(session_id = %session.id, messages = session.messages.len(), "Investigation complete");
        Ok(())
    }

    pub async fn save_session(&self, session_id: &str) -> Result<SessionSummary> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        self.inner.store.save(&session).await?;
        info!(session_id = %session_id, "Saved session");
        Ok(session.summary())
    }

    /// Replace the in-memory session with its saved snapshot.
    pub async fn load_session(&self, session_id: &str) -> Result<SessionStatus> {
        let session = self.load_from_store(session_id).await?;
        let status = SessionStatus::of(&session);

        let mut pending = Some(session);
        let existing = {
            let mut active = self.inner.active.write().await;
            let existing = active.get(session_id).cloned();
            if existing.is_none() {
                if let Some(session) = pending.take() {
                    active.insert(session_id.to_string(), Arc::new(Mutex::new(session)));
                }
            }
            existing
        };
        if let (Some(handle), Some(session)) = (existing, pending) {
            *handle.lock().await = session;
        }

        info!(session_id = %session_id, "Loaded session");
        Ok(status)
    }

    pub async fn list_saved_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.inner.store.list().await?)
    }

    /// Remove a session from memory, the store, the transcript and the index.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let in_memory = self.inner.active.write().await.remove(session_id).is_some();
        let saved = match self.inner.store.delete(session_id).await {
            Ok(saved) => saved,
            Err(specforge_storage::Error::InvalidInput(_)) => false,
            Err(e) => return Err(e.into()),
        };

        if !in_memory && !saved {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let vectors = self.inner.interactions.delete_session(session_id).await?;
        info!(session_id = %session_id, vectors, "Deleted session");
        Ok(())
    }

    // ========================================================================
    // Synthesis
    // ========================================================================

    /// Build the brief on demand, optionally with extra focus areas.
    pub async fn synthesize(
        &self,
        session_id: &str,
        options: &SynthesisOptions,
    ) -> Result<SynthesizedPrompt> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        self.synthesize_locked(&session, options).await
    }

    async fn synthesize_locked(
        &self,
        session: &Session,
        options: &SynthesisOptions,
    ) -> Result<SynthesizedPrompt> {
        let entries = self.inner.interactions.transcript(&session.id).await?;
        Ok(self.inner.synthesizer.synthesize(&entries, options))
    }
}

/// Text of the question awaiting an answer.
fn pending_question_text(session: &Session) -> Result<String> {
    if session.expected_role() != Role::User {
        return Err(Error::Internal(format!(
            "Session {} has no pending question",
            session.id
        )));
    }
    session
        .pending_question()
        .map(|m| m.content.clone())
        .ok_or_else(|| Error::Internal(format!("Session {} has no pending question", session.id)))
}
