// src/infra/errors.rs — Error types for genbot

use thiserror::Error;

use crate::session::{BackendKind, JobId, SessionKey};

#[derive(Error, Debug)]
pub enum GenBotError {
    // Registry errors (recoverable, surfaced to the chat)
    #[error("Session {0} not found")]
    SessionNotFound(SessionKey),

    #[error("{kind} job {id} not found in session {session}")]
    JobNotFound {
        session: SessionKey,
        kind: BackendKind,
        id: JobId,
    },

    #[error("Session {0} already exists")]
    AlreadyExists(SessionKey),

    #[error("{kind} job {id} is already used in session {session}")]
    AlreadyUsed {
        session: SessionKey,
        kind: BackendKind,
        id: JobId,
    },

    // Admission control
    #[error("Service overloaded: task queue is full")]
    Overloaded,

    #[error("Task queue is closed")]
    QueueClosed,

    // Job outcomes
    #[error("Job canceled")]
    Canceled,

    #[error("Job deadline exceeded")]
    DeadlineExceeded,

    // Backend errors
    #[error("Backend '{backend}' error: {message}")]
    Backend { backend: String, message: String },

    #[error("Backend '{backend}' quota exhausted: {message}")]
    QuotaExhausted { backend: String, message: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenBotError {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        GenBotError::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn quota(backend: impl Into<String>, message: impl Into<String>) -> Self {
        GenBotError::QuotaExhausted {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Session or job absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GenBotError::SessionNotFound(_) | GenBotError::JobNotFound { .. }
        )
    }

    /// The job context was canceled by a user command or teardown.
    /// Deadline expiry is reported separately and is treated as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GenBotError::Canceled)
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, GenBotError::QuotaExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, GenBotError>;
