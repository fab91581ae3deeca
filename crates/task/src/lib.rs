//! Transfer tasks: resolve a transfer link, then move the bytes.
//!
//! A [`TransferTask`] is created per file and direction. Link resolution is
//! delegated to a caller-supplied [`LinkResolver`]; the byte transfer runs on
//! the shared [`TransferWorker`](linkxfer_transfer::TransferWorker).

mod direction;
pub mod error;
pub mod resolver;
pub mod task;
pub mod types;

pub use error::{ResolveError, TaskError};
pub use resolver::{Account, DownloadLink, LinkResolver, UploadLink};
pub use task::TransferTask;
pub use types::{TaskDirection, TaskEvent, TaskState, TransferIdentity};
