use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Clock deletion is blocked because the remote job could not be
    /// removed — deleting the local row anyway would orphan the remote job.
    #[error("Clock deletion blocked: {0}")]
    DeleteBlocked(String),

    #[error("Queue dispatch failed: {0}")]
    Queue(String),

    #[error(transparent)]
    Store(#[from] timekeeper_store::StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
