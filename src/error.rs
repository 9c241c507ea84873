use thiserror::Error;

use crate::model::SyncSource;

/// Failure taxonomy shared by clients, the mapper, the store and the run boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Timeout, non-2xx status or malformed body. Fatal for the run.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single record is missing a required field or has an unusable value.
    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("a {0} sync is already running")]
    AlreadyRunning(SyncSource),

    #[error("run deadline exceeded before {0}")]
    DeadlineExceeded(String),

    #[error("sync run {0} already reached a terminal state")]
    RunAlreadyFinished(i64),
}

impl SyncError {
    /// Errors that only invalidate the current record, not the whole run.
    pub fn is_record_error(&self) -> bool {
        matches!(self, SyncError::Mapping(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
