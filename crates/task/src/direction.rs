//! Per-direction strategy: which link to ask for and which executor to run.

use linkxfer_transfer::TransferRequest;

use crate::error::ResolveError;
use crate::resolver::{DownloadLink, LinkResolver, UploadLink};
use crate::types::{TaskDirection, TransferIdentity};

/// A resolved transfer link together with its direction-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedLink {
    Download(DownloadLink),
    Upload(UploadLink),
}

impl ResolvedLink {
    /// Builds the executor request, consuming the link.
    pub(crate) fn into_request(self, identity: &TransferIdentity) -> TransferRequest {
        let local_path = identity.local_path.clone();
        match self {
            Self::Download(link) => TransferRequest::Download {
                url: link.link,
                local_path,
            },
            Self::Upload(link) => TransferRequest::Upload {
                url: link.link,
                parent_dir: link.parent_dir,
                local_path,
            },
        }
    }
}

impl TaskDirection {
    /// Issues the link-resolution request for this direction.
    pub(crate) async fn request_link(
        self,
        resolver: &dyn LinkResolver,
        identity: &TransferIdentity,
    ) -> Result<ResolvedLink, ResolveError> {
        let TransferIdentity {
            account,
            repo_id,
            remote_path,
            ..
        } = identity;
        match self {
            Self::Download => resolver
                .resolve_download_link(account, repo_id, remote_path)
                .await
                .map(ResolvedLink::Download),
            Self::Upload => resolver
                .resolve_upload_link(account, repo_id, remote_path)
                .await
                .map(ResolvedLink::Upload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Account;
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;

    struct EchoResolver;

    impl LinkResolver for EchoResolver {
        fn resolve_download_link<'a>(
            &'a self,
            _account: &'a Account,
            repo_id: &'a str,
            path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<DownloadLink, ResolveError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(DownloadLink {
                    link: format!("https://fs.example/dl/{repo_id}{path}"),
                    file_id: "deadbeef".into(),
                })
            })
        }

        fn resolve_upload_link<'a>(
            &'a self,
            _account: &'a Account,
            repo_id: &'a str,
            path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<UploadLink, ResolveError>> + Send + 'a>> {
            Box::pin(async move {
                Ok(UploadLink {
                    link: format!("https://fs.example/ul/{repo_id}"),
                    parent_dir: path.to_string(),
                })
            })
        }
    }

    fn identity() -> TransferIdentity {
        TransferIdentity {
            account: Account {
                server_url: "https://files.example".into(),
                username: "u".into(),
                token: "t".into(),
            },
            repo_id: "r1".into(),
            remote_path: "/docs".into(),
            local_path: PathBuf::from("/tmp/local.bin"),
        }
    }

    #[tokio::test]
    async fn download_builds_get_request() {
        let id = identity();
        let link = TaskDirection::Download
            .request_link(&EchoResolver, &id)
            .await
            .unwrap();
        assert!(matches!(&link, ResolvedLink::Download(l) if l.file_id == "deadbeef"));

        let request = link.into_request(&id);
        assert_eq!(
            request,
            TransferRequest::Download {
                url: "https://fs.example/dl/r1/docs".into(),
                local_path: PathBuf::from("/tmp/local.bin"),
            }
        );
    }

    #[tokio::test]
    async fn upload_carries_parent_dir() {
        let id = identity();
        let link = TaskDirection::Upload
            .request_link(&EchoResolver, &id)
            .await
            .unwrap();
        let request = link.into_request(&id);
        assert_eq!(
            request,
            TransferRequest::Upload {
                url: "https://fs.example/ul/r1".into(),
                parent_dir: "/docs".into(),
                local_path: PathBuf::from("/tmp/local.bin"),
            }
        );
    }
}
