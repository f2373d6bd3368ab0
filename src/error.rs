// src/error.rs
use thiserror::Error;

/// Failures while mapping a display name to a per-game account id.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Unknown game: {0:?}")]
    UnknownGame(String),

    #[error("No account found for player {0:?}")]
    NotFound(String),

    #[error("Identity lookup failed for {name:?}: {reason}")]
    LookupFailed { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Server not found: {0}")]
    ServerNotFound(i64),

    #[error("Player not found: {0}")]
    PlayerNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification rejected with status {0}")]
    Status(u16),
}

/// Failures while reading a game's on-disk statistics files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read stats file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stats file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Trigger {trigger} could not parse line: {line:?}")]
    Parse { trigger: &'static str, line: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SentinelResult<T> = Result<T, SentinelError>;
