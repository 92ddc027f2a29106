//! JSON snapshots of the session aggregate.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_models::{Session, SessionSummary};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::{validate_session_id, write_atomic};

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk envelope around a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub session: Session,
}

/// Durable store for whole sessions.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the full aggregate, replacing any previous snapshot.
    async fn save(&self, session: &Session) -> Result<()>;

    /// `Ok(None)` when nothing was saved; [`Error::Corrupted`] when the file
    /// exists but cannot be decoded.
    async fn load(&self, session_id: &str) -> Result<Option<Session>>;

    /// Summaries of every readable snapshot, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionSummary>>;

    /// Returns whether a snapshot existed.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

/// Snapshots under `{base_dir}/{session_id}.json`.
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self
            .base_dir
            .join(format!("{}.json", validate_session_id(session_id)?)))
    }

    async fn read_snapshot(path: &Path) -> Result<Option<SessionSnapshot>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Corrupted {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Corrupted {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;

        let snapshot = SessionSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            session: session.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Internal(format!("Failed to serialize session: {}", e)))?;

        write_atomic(&path, &json).await?;

        debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            path = %path.display(),
            "Saved session snapshot"
        );

        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.path_for(session_id)?;
        let snapshot = Self::read_snapshot(&path).await?;

        if let Some(ref s) = snapshot {
            if s.session.id != session_id {
                return Err(Error::Corrupted {
                    path: path.display().to_string(),
                    reason: format!("file holds session {}", s.session.id),
                });
            }
        }

        Ok(snapshot.map(|s| s.session))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut dir = match fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::read_snapshot(&path).await {
                Ok(Some(snapshot)) => summaries.push(snapshot.session.summary()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(session_id = %session_id, "Deleted saved session");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_models::{Category, Message, Question};

    fn sample(id: &str) -> Session {
        let mut session = Session::new(id);
        session.state = Category::Users;
        session
            .push_message(Message::from_question(&Question::category(
                Category::Functionality,
                "What does it do?",
            )))
            .unwrap();
        session
            .push_message(Message::answer(Category::Functionality, "Schedules walks"))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        store.save(&sample("s1")).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();

        assert_eq!(loaded.state, Category::Users);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].content, "Schedules walks");
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, Error::Corrupted { .. }));
    }

    #[tokio::test]
    async fn test_list_sorted_and_skips_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let older = sample("older");
        store.save(&older).await.unwrap();
        let mut newer = sample("newer");
        newer.metadata.updated_at = older.metadata.updated_at + chrono::Duration::seconds(5);
        store.save(&newer).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let summaries = store.list().await.unwrap();
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&sample("s1")).await.unwrap();

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
