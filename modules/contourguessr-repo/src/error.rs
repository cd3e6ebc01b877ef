use thiserror::Error;

use crate::challenge_id::InvalidChallengeId;

/// Errors returned by the query operations on [`crate::Repo`].
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("no challenges available")]
    NoChallengesAvailable,

    #[error("challenge not found")]
    ChallengeNotFound,

    #[error("invalid challenge id: {0}")]
    InvalidId(#[from] InvalidChallengeId),

    #[error("repo failed to start: {0}")]
    StartupFailed(String),

    /// Store failure. Details are logged, not returned.
    #[error("internal error")]
    Internal,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}
