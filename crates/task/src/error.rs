//! Task error types.

use linkxfer_transfer::TransferError;

/// Failure reported by a [`LinkResolver`](crate::LinkResolver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors produced by a [`TransferTask`](crate::TransferTask).
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("link resolution failed: {0}")]
    LinkResolution(#[from] ResolveError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("cancelled")]
    Cancelled,

    #[error("task already started")]
    AlreadyStarted,

    #[error("no Tokio runtime to drive the task")]
    NoRuntime,
}

impl TaskError {
    /// Returns `true` when the task ended because of `cancel()`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
