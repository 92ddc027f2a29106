//! Durable storage for specforge.
//!
//! Two stores live here:
//! - [`FileTranscriptStore`]: a human-readable markdown log of every
//!   question/answer pair, one file per session.
//! - [`FileSessionStore`]: JSON snapshots of the full session aggregate.
//!
//! Every rewrite goes through [`write_atomic`], so a crash mid-write leaves
//! either the old file or the new one, never a torn mix.

pub mod error;
mod id;
pub mod sessions;
pub mod transcript;

pub use error::{Error, Result};
pub use id::{validate_session_id, MAX_SESSION_ID_LEN};
pub use sessions::{FileSessionStore, SessionSnapshot, SessionStore};
pub use transcript::{FileTranscriptStore, TranscriptEntry, TranscriptStore};

use std::path::Path;

use tokio::fs;

/// Write `content` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            Error::Internal(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).await.map_err(|e| {
        Error::Internal(format!(
            "Failed to write {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::Internal(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("s.json");

        write_atomic(&path, "first").await.unwrap();
        write_atomic(&path, "second").await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }
}
