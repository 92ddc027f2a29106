//! Markdown transcript log, one file per session.
//!
//! Each interaction is rendered as a block ending in a `-----` delimiter:
//!
//! ```text
//! ### Interaction (users)
//! **Chunk:** 3f2a_1715000000000000
//!
//! **Question:** Who are the primary users of your product?
//!
//! **Answer:** Freelance dog walkers in mid-sized cities.
//!
//! **Timestamp:** 2024-05-06T12:00:00+00:00
//!
//! -----
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_models::Category;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::{validate_session_id, write_atomic};

const DELIMITER: &str = "-----";
const HEADER_PREFIX: &str = "### Interaction (";
const CHUNK_MARKER: &str = "**Chunk:** ";
const QUESTION_MARKER: &str = "**Question:** ";
const ANSWER_MARKER: &str = "\n\n**Answer:** ";
const TIMESTAMP_MARKER: &str = "\n\n**Timestamp:** ";

/// One question/answer pair in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub chunk_id: String,
    pub category: Category,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    fn render(&self) -> String {
        format!(
            "{}{})\n{}{}\n\n{}{}{}{}{}{}\n\n{}\n\n",
            HEADER_PREFIX,
            self.category,
            CHUNK_MARKER,
            self.chunk_id,
            QUESTION_MARKER,
            escape(&self.question),
            ANSWER_MARKER,
            escape(&self.answer),
            TIMESTAMP_MARKER,
            self.timestamp.to_rfc3339(),
            DELIMITER,
        )
    }

    fn parse(block: &str) -> Option<Self> {
        let block = block.trim();
        let header_end = block.find('\n')?;
        let category = block[..header_end]
            .strip_prefix(HEADER_PREFIX)?
            .strip_suffix(')')?
            .parse()
            .ok()?;

        let rest = &block[header_end + 1..];
        let chunk_line_end = rest.find('\n')?;
        let chunk_id = rest[..chunk_line_end].strip_prefix(CHUNK_MARKER)?.trim();

        let q_start = rest.find(QUESTION_MARKER)? + QUESTION_MARKER.len();
        let a_marker = q_start + rest[q_start..].find(ANSWER_MARKER)?;
        let t_marker = rest.rfind(TIMESTAMP_MARKER)?;
        if t_marker < a_marker {
            return None;
        }

        let question = unescape(&rest[q_start..a_marker]);
        let answer = unescape(&rest[a_marker + ANSWER_MARKER.len()..t_marker]);
        let timestamp = DateTime::parse_from_rfc3339(rest[t_marker + TIMESTAMP_MARKER.len()..].trim())
            .ok()?
            .with_timezone(&Utc);

        Some(Self {
            chunk_id: chunk_id.to_string(),
            category,
            question,
            answer,
            timestamp,
        })
    }
}

/// Keep user text from forging a delimiter line.
fn escape(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim_start_matches('\\').trim() == DELIMITER {
                format!("\\{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape(text: &str) -> String {
    text.lines()
        .map(|line| match line.strip_prefix('\\') {
            Some(rest) if rest.trim_start_matches('\\').trim() == DELIMITER => rest.to_string(),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a whole transcript, skipping blocks that do not parse.
pub fn parse_transcript(content: &str) -> Vec<TranscriptEntry> {
    content
        .split(&format!("\n{}\n", DELIMITER))
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let entry = TranscriptEntry::parse(block);
            if entry.is_none() {
                warn!(
                    preview = %block.trim().chars().take(60).collect::<String>(),
                    "Skipping malformed transcript block"
                );
            }
            entry
        })
        .collect()
}

/// Append-only log of a session's interactions.
#[async_trait::async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, session_id: &str, entry: &TranscriptEntry) -> Result<()>;

    /// All entries in append order; empty when nothing was recorded.
    async fn read(&self, session_id: &str) -> Result<Vec<TranscriptEntry>>;

    /// Replace the answer of one entry in place. Returns the updated entry.
    async fn amend(&self, session_id: &str, chunk_id: &str, answer: &str)
        -> Result<TranscriptEntry>;

    /// Drop one entry. Returns whether it was present.
    async fn remove(&self, session_id: &str, chunk_id: &str) -> Result<bool>;

    /// Remove the transcript. Returns whether one existed.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

/// Transcript files under `{base_dir}/{session_id}.md`.
pub struct FileTranscriptStore {
    base_dir: PathBuf,
    /// Write locks per session file.
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileTranscriptStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn write_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of a session's transcript.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self
            .base_dir
            .join(format!("{}.md", validate_session_id(session_id)?)))
    }

    async fn read_path(path: &Path) -> Result<Vec<TranscriptEntry>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(parse_transcript(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Internal(format!(
                "Failed to read transcript {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn append(&self, session_id: &str, entry: &TranscriptEntry) -> Result<()> {
        let path = self.path_for(session_id)?;
        let lock = self.write_lock(session_id).await;
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.base_dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to open transcript {}: {}",
                    path.display(),
                    e
                ))
            })?;

        file.write_all(entry.render().as_bytes()).await?;
        file.flush().await?;

        debug!(
            session_id = %session_id,
            chunk_id = %entry.chunk_id,
            category = %entry.category,
            "Appended transcript entry"
        );

        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<TranscriptEntry>> {
        let path = self.path_for(session_id)?;
        Self::read_path(&path).await
    }

    async fn amend(
        &self,
        session_id: &str,
        chunk_id: &str,
        answer: &str,
    ) -> Result<TranscriptEntry> {
        let path = self.path_for(session_id)?;
        let lock = self.write_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut entries = Self::read_path(&path).await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.chunk_id == chunk_id)
            .ok_or_else(|| Error::NotFound(format!("interaction {}", chunk_id)))?;
        entry.answer = answer.to_string();
        let updated = entry.clone();

        let content: String = entries.iter().map(TranscriptEntry::render).collect();
        write_atomic(&path, &content).await?;

        info!(session_id = %session_id, chunk_id = %chunk_id, "Amended transcript entry");

        Ok(updated)
    }

    async fn remove(&self, session_id: &str, chunk_id: &str) -> Result<bool> {
        let path = self.path_for(session_id)?;
        let lock = self.write_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut entries = Self::read_path(&path).await?;
        let before = entries.len();
        entries.retain(|e| e.chunk_id != chunk_id);
        if entries.len() == before {
            return Ok(false);
        }

        let content: String = entries.iter().map(TranscriptEntry::render).collect();
        write_atomic(&path, &content).await?;

        info!(session_id = %session_id, chunk_id = %chunk_id, "Removed transcript entry");

        Ok(true)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id)?;
        let lock = self.write_lock(session_id).await;
        let _guard = lock.lock().await;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Internal(format!(
                "Failed to delete transcript {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
