use thiserror::Error;

/// Errors surfaced by the remote scheduler/queue clients.
///
/// `NotFound` and `PermissionDenied` are first-class variants because the
/// reconciler's state machine branches on them; everything else the provider
/// can say collapses into `Denied` with the status and message attached.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("lacks permission: {0}")]
    PermissionDenied(String),

    #[error("remote call denied (HTTP {status}): {message}")]
    Denied { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token error: {0}")]
    Token(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
