use std::path::PathBuf;

use crate::session::SessionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but is still indexing or its indexing run failed.
    #[error("session {session_id} is not ready (status: {status})")]
    SessionNotReady {
        session_id: String,
        status: SessionStatus,
    },

    #[error("session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("repository not found: {}", .0.display())]
    RepoNotFound(PathBuf),

    #[error(transparent)]
    Index(#[from] gitsleuth_index::IndexError),

    #[error("session registry lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
