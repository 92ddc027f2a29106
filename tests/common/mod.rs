//! Shared test harness.
//!
//! Wires the investigation service to a scripted completion provider, the
//! local hash embedder, an in-memory vector index and file stores under a
//! temporary directory.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use specforge::config::InvestigationConfig;
use specforge::services::{Collaborators, InvestigationService};
use specforge::state::ProviderSummary;
use specforge::AppState;
use specforge_embeddings::{EmbeddingConfig, EmbeddingService};
use specforge_llm::{CompletionProvider, Error as LlmError, RetryPolicy};
use specforge_storage::{FileSessionStore, FileTranscriptStore};
use specforge_vectors::MemoryVectorIndex;
use tempfile::TempDir;

pub const FOLLOWUP_REPLY: &str = "Could you walk me through that in more detail?";

// ============================================================================
// Scripted completion provider
// ============================================================================

/// Replays queued replies, then falls back to a fixed follow-up question.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _temperature: f32,
    ) -> specforge_llm::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FOLLOWUP_REPLY.to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub service: InvestigationService,
    pub completion: Arc<ScriptedCompletion>,
    pub dir: TempDir,
}

impl Harness {
    pub fn sessions_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("sessions")
    }

    pub fn transcripts_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("conversations")
    }

    /// A second service over the same files, as after a restart.
    pub fn restarted(&self) -> InvestigationService {
        build_service(self.dir.path(), self.completion.clone(), test_config())
    }

    pub fn app(&self) -> axum::Router {
        specforge::app(AppState::from_service(
            self.service.clone(),
            ProviderSummary {
                completion: vec!["scripted".to_string()],
                embedding: vec![],
                vector_backend: "memory".to_string(),
            },
        ))
    }
}

/// Retries without waiting so failure paths stay fast.
pub fn test_config() -> InvestigationConfig {
    InvestigationConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        ..Default::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: InvestigationConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let completion = Arc::new(ScriptedCompletion::default());
    let service = build_service(dir.path(), completion.clone(), config);
    Harness {
        service,
        completion,
        dir,
    }
}

pub fn build_service(
    root: &Path,
    completion: Arc<dyn CompletionProvider>,
    config: InvestigationConfig,
) -> InvestigationService {
    let embeddings = EmbeddingService::from_config(&EmbeddingConfig::default()).unwrap();
    let index = MemoryVectorIndex::with_dimension(embeddings.dimension());

    InvestigationService::new(
        Collaborators {
            embedder: Arc::new(embeddings),
            index: Arc::new(index),
            transcripts: Arc::new(FileTranscriptStore::new(root.join("conversations"))),
            sessions: Arc::new(FileSessionStore::new(root.join("sessions"))),
            completion,
        },
        config,
    )
}

// ============================================================================
// Answers
// ============================================================================

/// An answer long enough to move on to the next category.
pub fn detailed(topic: &str) -> String {
    format!(
        "{} is something we have thought about a lot and we want it to be simple, \
         reliable and pleasant for everyone who relies on it every day",
        topic
    )
}

/// An answer short enough to trigger a follow-up.
pub fn brief(topic: &str) -> String {
    format!("Mostly {} I think", topic)
}
