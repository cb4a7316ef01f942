//! Error types for the jobchat client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("no candidate socket path accepted the connection ({attempts} attempts)")]
    AllPathsFailed { attempts: usize },

    #[error("authentication required: {0}")]
    Auth(&'static str),

    #[error("server reported error: {0}")]
    Server(String),
}

impl ChatError {
    /// Returns true if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Http(_) => true,
            ChatError::Timeout(_) => true,
            ChatError::Transport(_) => true,

            ChatError::Json(_) => false,
            ChatError::AllPathsFailed { .. } => false,
            ChatError::Auth(_) => false,
            ChatError::Server(_) => false,
        }
    }
}

/// Result type for chat client operations
pub type ChatResult<T> = Result<T, ChatError>;
