//! Interaction store.
//!
//! Every answered question is written twice: to the session's markdown
//! transcript (append-only, human-readable) and to the vector index as a
//! normalized embedding of `Q: …\nA: …`. Edits rewrite both in place.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use specforge_embeddings::{normalize, EmbeddingProvider};
use specforge_models::{compose_text, Category, InteractionChunk};
use specforge_storage::{TranscriptEntry, TranscriptStore};
use specforge_vectors::{ChunkMetadata, SessionFilter, VectorEntry, VectorIndex};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Dual-write store for question/answer pairs.
#[derive(Clone)]
pub struct InteractionStore {
    inner: Arc<InteractionStoreInner>,
}

struct InteractionStoreInner {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    transcripts: Arc<dyn TranscriptStore>,
    /// Last issued chunk suffix, in microseconds.
    last_suffix: AtomicI64,
}

impl InteractionStore {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            inner: Arc::new(InteractionStoreInner {
                embedder,
                index,
                transcripts,
                last_suffix: AtomicI64::new(0),
            }),
        }
    }

    /// Embed text the same way stored chunks are embedded.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(normalize(self.inner.embedder.embed(text).await?))
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.inner.index
    }

    /// Current microsecond clock, bumped past the last issued value.
    fn next_suffix(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.inner.last_suffix.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.inner.last_suffix.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    fn chunk_id(&self, session_id: &str) -> String {
        format!("{}_{}", session_id, self.next_suffix())
    }

    /// Record one answered question.
    pub async fn persist(
        &self,
        session_id: &str,
        category: Category,
        question: &str,
        answer: &str,
    ) -> Result<InteractionChunk> {
        let chunk = InteractionChunk {
            id: self.chunk_id(session_id),
            session_id: session_id.to_string(),
            category,
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        };

        self.inner
            .transcripts
            .append(
                session_id,
                &TranscriptEntry {
                    chunk_id: chunk.id.clone(),
                    category,
                    question: chunk.question.clone(),
                    answer: chunk.answer.clone(),
                    timestamp: chunk.timestamp,
                },
            )
            .await?;

        if let Err(e) = self.index_chunk(&chunk).await {
            self.discard_transcript_entry(session_id, &chunk.id).await;
            return Err(e);
        }

        debug!(
            session_id = %session_id,
            chunk_id = %chunk.id,
            category = %category,
            "Persisted interaction"
        );

        Ok(chunk)
    }

    async fn index_chunk(&self, chunk: &InteractionChunk) -> Result<()> {
        let text = chunk.text();
        let vector = self.embed(&text).await?;

        self.inner
            .index
            .upsert(VectorEntry {
                id: chunk.id.clone(),
                vector,
                text,
                metadata: ChunkMetadata {
                    session_id: chunk.session_id.clone(),
                    timestamp: chunk.timestamp,
                    question: chunk.question_summary(),
                    category: chunk.category,
                },
            })
            .await?;

        Ok(())
    }

    /// Replace the answer of an existing chunk, keeping its timestamp.
    pub async fn update_interaction(
        &self,
        session_id: &str,
        chunk_id: &str,
        new_answer: &str,
    ) -> Result<InteractionChunk> {
        let filter = SessionFilter::new(session_id);
        let existing = self
            .inner
            .index
            .get(&filter, chunk_id)
            .await?
            .ok_or_else(|| Error::Validation(format!("Unknown interaction: {}", chunk_id)))?;

        // The transcript holds the untruncated question
        let entry = self
            .inner
            .transcripts
            .amend(session_id, chunk_id, new_answer)
            .await?;

        let chunk = InteractionChunk {
            id: chunk_id.to_string(),
            session_id: session_id.to_string(),
            category: existing.metadata.category,
            question: entry.question,
            answer: new_answer.to_string(),
            timestamp: existing.metadata.timestamp,
        };

        self.inner.index.delete(&filter, chunk_id).await?;
        self.index_chunk(&chunk).await?;

        info!(session_id = %session_id, chunk_id = %chunk_id, "Updated interaction");

        Ok(chunk)
    }

    /// Undo [`persist`](Self::persist) for one chunk, in the index and the transcript.
    pub async fn delete_chunk(&self, session_id: &str, chunk_id: &str) -> Result<bool> {
        let indexed = self
            .inner
            .index
            .delete(&SessionFilter::new(session_id), chunk_id)
            .await?;
        let logged = self.inner.transcripts.remove(session_id, chunk_id).await?;

        info!(session_id = %session_id, chunk_id = %chunk_id, "Deleted interaction");

        Ok(indexed || logged)
    }

    async fn discard_transcript_entry(&self, session_id: &str, chunk_id: &str) {
        if let Err(e) = self.inner.transcripts.remove(session_id, chunk_id).await {
            warn!(
                session_id = %session_id,
                chunk_id = %chunk_id,
                error = %e,
                "Failed to remove unindexed transcript entry"
            );
        }
    }

    /// Transcript entries in the order they were recorded.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>> {
        Ok(self.inner.transcripts.read(session_id).await?)
    }

    /// Drop every vector and the transcript of a session.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let removed = self
            .inner
            .index
            .delete_session(&SessionFilter::new(session_id))
            .await?;
        self.inner.transcripts.delete(session_id).await?;

        info!(session_id = %session_id, vectors = removed, "Deleted session interactions");

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_embeddings::{EmbeddingConfig, EmbeddingService};
    use specforge_storage::FileTranscriptStore;
    use specforge_vectors::MemoryVectorIndex;

    fn store(dir: &std::path::Path) -> InteractionStore {
        let embedder = EmbeddingService::from_config(&EmbeddingConfig::default()).unwrap();
        InteractionStore::new(
            Arc::new(embedder),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(FileTranscriptStore::new(dir)),
        )
    }

    #[tokio::test]
    async fn test_persist_writes_transcript_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let chunk = store
            .persist("s1", Category::Users, "Who uses it?", "Dog walkers")
            .await
            .unwrap();

        assert!(chunk.id.starts_with("s1_"));
        let transcript = store.transcript("s1").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].chunk_id, chunk.id);

        let stored = store
            .index()
            .get(&SessionFilter::new("s1"), &chunk.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.text, "Q: Who uses it?\nA: Dog walkers");
        assert_eq!(stored.metadata.category, Category::Users);
    }

    #[tokio::test]
    async fn test_chunk_ids_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let suffixes: Vec<i64> = (0..50).map(|_| store.next_suffix()).collect();
        assert!(suffixes.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_update_keeps_timestamp_and_replaces_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let original = store
            .persist("s1", Category::Functionality, "What does it do?", "Tracks walks")
            .await
            .unwrap();
        let updated = store
            .update_interaction("s1", &original.id, "Schedules and pays walkers")
            .await
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.timestamp, original.timestamp);

        let filter = SessionFilter::new("s1");
        assert_eq!(store.index().count(&filter).await.unwrap(), 1);
        let stored = store.index().get(&filter, &original.id).await.unwrap().unwrap();
        assert!(stored.text.contains("Schedules and pays walkers"));
        assert!(!stored.text.contains("Tracks walks"));
        assert_eq!(stored.metadata.timestamp, original.timestamp);

        let transcript = store.transcript("s1").await.unwrap();
        assert_eq!(transcript[0].answer, "Schedules and pays walkers");
    }

    #[tokio::test]
    async fn test_update_unknown_chunk_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let err = store
            .update_interaction("s1", "s1_42", "anything")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("s1_42")));
    }

    #[tokio::test]
    async fn test_update_is_scoped_to_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let chunk = store
            .persist("a", Category::Market, "Competitors?", "Rover")
            .await
            .unwrap();
        assert!(store.update_interaction("b", &chunk.id, "Wag").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_chunk_removes_both_copies() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let kept = store.persist("s1", Category::Users, "Who?", "Walkers").await.unwrap();
        let dropped = store.persist("s1", Category::Users, "Who?", "Walkers").await.unwrap();

        assert!(store.delete_chunk("s1", &dropped.id).await.unwrap());
        assert!(!store.delete_chunk("s1", &dropped.id).await.unwrap());

        let filter = SessionFilter::new("s1");
        assert_eq!(store.index().count(&filter).await.unwrap(), 1);
        assert!(store.index().get(&filter, &dropped.id).await.unwrap().is_none());

        let transcript = store.transcript("s1").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].chunk_id, kept.id);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.persist("s1", Category::Users, "Who?", "Walkers").await.unwrap();
        store.persist("s1", Category::Market, "Rivals?", "Rover").await.unwrap();

        assert_eq!(store.delete_session("s1").await.unwrap(), 2);
        assert!(store.transcript("s1").await.unwrap().is_empty());
    }
}
