//! Automatic session checkpoints.

use specforge_models::Session;

/// Completed pairs between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;

/// True when `completed` has reached a multiple of `interval` not yet saved.
pub fn checkpoint_due(completed: usize, last_checkpoint: usize, interval: usize) -> bool {
    let interval = interval.max(1);
    completed >= interval && completed / interval > last_checkpoint / interval
}

/// Check the session and, if due, mark it checkpointed. The caller saves it.
pub fn mark_if_due(session: &mut Session, interval: usize) -> bool {
    let completed = session.completed_pairs();
    if checkpoint_due(completed, session.metadata.last_checkpoint, interval) {
        session.metadata.last_checkpoint = completed;
        true
    } else {
        false
    }
}
