use thiserror::Error;

/// All persistence-layer errors. Kept separate from the core error so the
/// gateway can map them to HTTP statuses without coupling layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    /// Raised when deleting a row that other rows still depend on
    /// (a task with steps or schedules) without an explicit cascade.
    #[error("Protected delete: {0}")]
    ProtectedDelete(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
