use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// What the executor should do with a resolved link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    /// GET `url` into a staged temp file, then rename it to `local_path`.
    Download { url: String, local_path: PathBuf },
    /// POST the contents of `local_path` to `url`, targeting `parent_dir`.
    Upload {
        url: String,
        parent_dir: String,
        local_path: PathBuf,
    },
}

impl TransferRequest {
    /// The local file read from or written to.
    pub fn local_path(&self) -> &std::path::Path {
        match self {
            Self::Download { local_path, .. } | Self::Upload { local_path, .. } => local_path,
        }
    }
}

/// A unit of work handed to the worker.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub request: TransferRequest,
    /// Checked by the executor at every chunk boundary.
    pub cancel: CancellationToken,
}

/// Message sent from the executor back to the owning task.
///
/// A job produces zero or more `Progress` messages followed by exactly one
/// `Finished`.
#[derive(Debug)]
pub enum ExecutorEvent {
    Progress { transferred: u64, total: u64 },
    Finished(Result<TransferOutcome, TransferError>),
}

/// Summary of a successful transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Bytes moved over the wire.
    pub bytes: u64,
    /// Response body returned by the file server on upload.
    pub response: Option<String>,
}

/// Counters owned by a running executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorState {
    pub bytes_transferred: u64,
    /// 0 until known.
    pub bytes_total: u64,
    pub canceled: bool,
}
