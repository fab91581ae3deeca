//! Raw byte transfer against a resolved transfer link.
//!
//! A transfer is executed by the [`TransferWorker`], a dedicated execution
//! context shared by every task. Downloads are staged in a temporary file
//! and renamed into place; uploads stream the local file as a multipart
//! body. Progress and completion are reported as [`ExecutorEvent`]s over a
//! per-job channel, and cancellation is cooperative through a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

mod chunked;
pub mod config;
mod download;
pub mod http;
mod progress;
pub mod transport;
pub mod types;
mod upload;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::path::PathBuf;

pub use config::TransferConfig;
pub use http::HttpTransport;
pub use transport::{ByteStream, DownloadResponse, Transport, UploadForm, UploadResponse};
pub use types::{ExecutorEvent, ExecutorState, TransferJob, TransferOutcome, TransferRequest};
pub use worker::{TransferWorker, WorkerHandle};

/// Default upload read size and progress granularity: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local file {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("cancelled")]
    Cancelled,

    #[error("transfer worker is not running")]
    WorkerClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalFile {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for user-initiated aborts.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
