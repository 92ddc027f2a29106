//! Application state for specforge.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use specforge_embeddings::EmbeddingService;
use specforge_llm::LlmService;
use specforge_storage::{FileSessionStore, FileTranscriptStore};
use specforge_vectors::{MemoryVectorIndex, QdrantVectorIndex, VectorIndex};
use tracing::info;

use crate::config::{self, Config, VectorBackend};
use crate::services::{Collaborators, InvestigationService};
use crate::Result;

/// Provider wiring reported by the health endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProviderSummary {
    pub completion: Vec<String>,
    pub embedding: Vec<String>,
    pub vector_backend: String,
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Investigation engine.
    pub investigation: InvestigationService,
    /// Configured providers, for status reporting.
    pub providers: Arc<ProviderSummary>,
}

impl AppState {
    /// Create a new application state from the global configuration.
    pub async fn new() -> Result<Self> {
        Self::from_config(config::config()).await
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let embeddings = EmbeddingService::from_config(&config.embedding)?;
        let dimension = embeddings.dimension();

        let (index, backend): (Arc<dyn VectorIndex>, &str) = match config.vectors.backend {
            VectorBackend::Memory => (Arc::new(MemoryVectorIndex::with_dimension(dimension)), "memory"),
            VectorBackend::Qdrant => (
                Arc::new(QdrantVectorIndex::connect(&config.vectors.qdrant, dimension).await?),
                "qdrant",
            ),
        };

        let llm = LlmService::new(&config.llm)?;

        let providers = ProviderSummary {
            completion: llm.providers().await,
            embedding: embeddings.providers(),
            vector_backend: backend.to_string(),
        };

        info!(
            data_dir = %config.storage.data_dir.display(),
            vector_backend = backend,
            dimension,
            "Initializing investigation service"
        );

        let investigation = InvestigationService::new(
            Collaborators {
                embedder: Arc::new(embeddings),
                index,
                transcripts: Arc::new(FileTranscriptStore::new(config.storage.transcripts_dir())),
                sessions: Arc::new(FileSessionStore::new(config.storage.sessions_dir())),
                completion: Arc::new(llm),
            },
            config.investigation.clone(),
        );

        Ok(Self::from_service(investigation, providers))
    }

    /// Wrap an already-built service.
    pub fn from_service(investigation: InvestigationService, providers: ProviderSummary) -> Self {
        Self {
            investigation,
            providers: Arc::new(providers),
        }
    }
}
