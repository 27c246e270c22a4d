use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimekeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Account not found: {email}")]
    AccountNotFound { email: String },

    #[error("Clock is broken: {0}")]
    BrokenClock(String),

    #[error("Step failed with status {status}")]
    StepFailure { status: i64, detail: serde_json::Value },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Remote scheduler error: {0}")]
    RemoteScheduler(String),

    #[error("Remote queue error: {0}")]
    RemoteQueue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimekeeperError {
    /// Short error code string included in API error bodies.
    pub fn code(&self) -> String {
        match self {
            TimekeeperError::Config(_) => "CONFIG_ERROR".into(),
            TimekeeperError::AuthFailed(_) => "AUTH_FAILED".into(),
            TimekeeperError::PermissionDenied { .. } => "PERMISSION_DENIED".into(),
            TimekeeperError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND".into(),
            TimekeeperError::BrokenClock(_) => "BROKEN_CLOCK".into(),
            // Step failures carry the HTTP status of the failing step so API
            // consumers can distinguish a 404 target from a 500 target.
            TimekeeperError::StepFailure { status, .. } => format!("task_{status}"),
            TimekeeperError::Database(_) => "DATABASE_ERROR".into(),
            TimekeeperError::RemoteScheduler(_) => "REMOTE_SCHEDULER_ERROR".into(),
            TimekeeperError::RemoteQueue(_) => "REMOTE_QUEUE_ERROR".into(),
            TimekeeperError::Serialization(_) => "SERIALIZATION_ERROR".into(),
            TimekeeperError::Io(_) => "IO_ERROR".into(),
            TimekeeperError::Internal(_) => "INTERNAL_ERROR".into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TimekeeperError>;
