//! `reqwest`-backed [`Transport`].

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use tokio_rustls::rustls;
use tracing::debug;

use crate::transport::{DownloadResponse, Transport, UploadForm, UploadResponse};
use crate::{TransferConfig, TransferError};

/// HTTP transport over a single shared client.
///
/// Certificates are always verified; a rejected peer becomes
/// [`TransferError::Tls`].
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client from `config`.
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DownloadResponse, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let total = response.content_length();
            debug!(status, ?total, "download response headers");

            let body = response.bytes_stream().map_err(map_reqwest_error).boxed();
            Ok(DownloadResponse {
                status,
                total,
                body,
            })
        })
    }

    fn post_file<'a>(
        &'a self,
        url: &'a str,
        form: UploadForm,
    ) -> Pin<Box<dyn Future<Output = Result<UploadResponse, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let part = Part::stream_with_length(reqwest::Body::wrap_stream(form.body), form.length)
                .file_name(form.file_name);
            let multipart = Form::new()
                .text("parent_dir", form.parent_dir)
                .part("file", part);

            let response = self
                .client
                .post(url)
                .multipart(multipart)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(map_reqwest_error)?;
            debug!(status, "upload response");
            Ok(UploadResponse { status, body })
        })
    }
}

/// Maps a `reqwest` error, splitting out TLS failures.
///
/// The URL is stripped first: transfer links are credentials and the
/// message ends up in logs.
fn map_reqwest_error(err: reqwest::Error) -> TransferError {
    let err = err.without_url();
    let message = error_chain(&err);
    if is_tls_failure(&err) {
        TransferError::Tls(message)
    } else {
        TransferError::Transport(message)
    }
}

/// Joins an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}

/// Returns `true` if a `rustls` error sits anywhere in the source chain.
///
/// The TLS stream reports handshake failures as an `io::Error` wrapping the
/// `rustls::Error`, and `io::Error::source` skips the wrapped error, so each
/// `io::Error` link is unwrapped explicitly.
fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && let Some(inner) = io.get_ref()
            && is_tls_failure(inner)
        {
            return true;
        }
        current = e.source();
    }
    false
}
