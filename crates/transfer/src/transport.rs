//! Transport seam between the executor and the file server.
//!
//! [`HttpTransport`](crate::HttpTransport) is the production implementation.
//! Keeping it behind a trait lets executor and task logic run against
//! scripted in-memory transports in tests.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::TransferError;

/// A stream of body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Response to a GET against a download link.
pub struct DownloadResponse {
    pub status: u16,
    /// From `Content-Length`, when the server sent one.
    pub total: Option<u64>,
    pub body: ByteStream,
}

/// Multipart upload body.
pub struct UploadForm {
    /// Target directory inside the repository.
    pub parent_dir: String,
    pub file_name: String,
    /// Exact number of bytes `body` will yield.
    pub length: u64,
    pub body: ByteStream,
}

/// Server acknowledgement of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

/// Abstract HTTP access to the file server.
///
/// Implementations must surface TLS certificate failures as
/// [`TransferError::Tls`] rather than accepting the peer.
pub trait Transport: Send + Sync {
    /// Issues a GET and returns once headers are available.
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DownloadResponse, TransferError>> + Send + 'a>>;

    /// POSTs `form`, driving its body stream to completion.
    fn post_file<'a>(
        &'a self,
        url: &'a str,
        form: UploadForm,
    ) -> Pin<Box<dyn Future<Output = Result<UploadResponse, TransferError>> + Send + 'a>>;
}

/// Returns `true` for 2xx statuses.
pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
