//! Resolver that hands out a link obtained out of band.

use std::future::Future;
use std::pin::Pin;

use linkxfer_task::{Account, DownloadLink, LinkResolver, ResolveError, UploadLink};

/// Answers every request with the link given on the command line.
pub struct FixedLinkResolver {
    link: String,
    file_id: String,
    parent_dir: String,
}

impl FixedLinkResolver {
    pub fn download(link: String, file_id: String) -> Self {
        Self {
            link,
            file_id,
            parent_dir: String::new(),
        }
    }

    pub fn upload(link: String, parent_dir: String) -> Self {
        Self {
            link,
            file_id: String::new(),
            parent_dir,
        }
    }

    fn checked_link(&self) -> Result<String, ResolveError> {
        if self.link.starts_with("http://") || self.link.starts_with("https://") {
            Ok(self.link.clone())
        } else {
            Err(ResolveError::MalformedResponse(format!(
                "not an HTTP link: {}",
                self.link
            )))
        }
    }
}

impl LinkResolver for FixedLinkResolver {
    fn resolve_download_link<'a>(
        &'a self,
        _account: &'a Account,
        _repo_id: &'a str,
        _path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DownloadLink, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(DownloadLink {
                link: self.checked_link()?,
                file_id: self.file_id.clone(),
            })
        })
    }

    fn resolve_upload_link<'a>(
        &'a self,
        _account: &'a Account,
        _repo_id: &'a str,
        _path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UploadLink, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(UploadLink {
                link: self.checked_link()?,
                parent_dir: self.parent_dir.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            server_url: String::new(),
            username: String::new(),
            token: String::new(),
        }
    }

    #[tokio::test]
    async fn returns_fixed_download_link() {
        let resolver = FixedLinkResolver::download("https://fs.example/dl/abc".into(), "id".into());
        let link = resolver
            .resolve_download_link(&account(), "r", "/a")
            .await
            .unwrap();
        assert_eq!(link.link, "https://fs.example/dl/abc");
        assert_eq!(link.file_id, "id");
    }

    #[tokio::test]
    async fn rejects_non_http_link() {
        let resolver = FixedLinkResolver::upload("ftp://fs.example/ul".into(), "/".into());
        let err = resolver
            .resolve_upload_link(&account(), "r", "/")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedResponse(_)));
    }
}
