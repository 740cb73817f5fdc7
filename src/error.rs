use std::io;
use std::path::PathBuf;

/// Errors that stop a watcher attempt.
///
/// Everything below the directory level (a locked journal, a half-written
/// line, a malformed record) is handled inside the pipeline and never shows
/// up here.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The journal directory is missing or unreadable.
    #[error("cannot read journal directory {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process holds the checkpoint lock.
    #[error("another monitor holds the checkpoint lock on {}", path.display())]
    CheckpointLocked { path: PathBuf },

    #[error("checkpoint I/O failed: {0}")]
    Checkpoint(#[source] io::Error),

    #[error("file watcher failed: {0}")]
    Notify(#[from] notify::Error),

    #[error("monitor thread panicked")]
    ThreadPanicked,
}

/// A journal line that could not be turned into a [`JournalEvent`](crate::JournalEvent).
///
/// Carries the raw line so the failure can be logged with context. Decode
/// failures are isolated to their line; the stream continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed journal line ({reason}): {line}")]
    Malformed { line: String, reason: String },

    #[error("journal line has no event kind: {line}")]
    MissingKind { line: String },
}

impl DecodeError {
    /// The raw line that failed to decode.
    pub fn line(&self) -> &str {
        match self {
            DecodeError::Malformed { line, .. } | DecodeError::MissingKind { line } => line,
        }
    }
}
