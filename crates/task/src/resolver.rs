//! Link resolution collaborator.
//!
//! The metadata service turns `(repo_id, path)` into a time-limited transfer
//! link. The caller implements [`LinkResolver`] on top of its API client;
//! the task only awaits the answer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Credentials for one account on a metadata server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub server_url: String,
    pub username: String,
    pub token: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Answer to a download link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub link: String,
    /// Server-assigned content identifier of the file.
    pub file_id: String,
}

/// Answer to an upload link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLink {
    pub link: String,
    /// Remote directory the uploaded file lands in.
    pub parent_dir: String,
}

/// Abstract metadata service.
///
/// Kept as a trait so task logic stays decoupled from the API client and is
/// testable with mocks.
pub trait LinkResolver: Send + Sync {
    /// Requests a GET link and the file identifier for `path`.
    fn resolve_download_link<'a>(
        &'a self,
        account: &'a Account,
        repo_id: &'a str,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DownloadLink, ResolveError>> + Send + 'a>>;

    /// Requests a POST link and the target parent directory for `path`.
    fn resolve_upload_link<'a>(
        &'a self,
        account: &'a Account,
        repo_id: &'a str,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadLink, ResolveError>> + Send + 'a>>;
}
