//! Repository module
//!
//! Plain async functions over the SQLite pool, one module per table.
//! Multi-step flows compose these over `&mut SqliteConnection` inside a
//! single transaction owned by the caller.

pub mod advancement;
pub mod audit;
pub mod member;
pub mod milestone;
pub mod org_setting;
pub mod points;
pub mod role_requirement;
pub mod streak;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    /// Lock-conflict class failures (SQLITE_BUSY / SQLITE_LOCKED) that a
    /// caller may retry after backoff. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RepoError::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some("5") | Some("6") | Some("261") | Some("517")
            ),
            RepoError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
