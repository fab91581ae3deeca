//! Upload executor: stream a local file as a multipart POST body.

use std::path::Path;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunked::ChunkReader;
use crate::progress::ProgressReporter;
use crate::transport::{ByteStream, Transport, UploadForm, is_success};
use crate::types::TransferOutcome;
use crate::{TransferConfig, TransferError};

/// Runs one upload.
///
/// The local file is opened before any network activity, so an unreadable
/// source fails without contacting the server. The reader moves into the
/// request body and is dropped with it, releasing the handle on every exit
/// path.
pub(crate) async fn run_upload(
    transport: &dyn Transport,
    config: &TransferConfig,
    url: &str,
    parent_dir: &str,
    local_path: &Path,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<TransferOutcome, TransferError> {
    if cancel.is_cancelled() {
        progress.mark_cancelled();
        return Err(TransferError::Cancelled);
    }

    let reader = ChunkReader::open(local_path, config.chunk_size).await?;
    let length = reader.file_size();
    progress.set_total(length);
    if length == 0 {
        progress.emit();
    }

    let file_name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!(file = %file_name, length, parent_dir, "streaming upload");

    let form = UploadForm {
        parent_dir: parent_dir.to_string(),
        file_name,
        length,
        body: body_stream(reader, progress.clone(), cancel.clone()),
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        response = transport.post_file(url, form) => response,
    };

    // A body aborted by cancellation surfaces as a transport error; report
    // it as the cancellation it is.
    if cancel.is_cancelled() {
        progress.mark_cancelled();
        return Err(TransferError::Cancelled);
    }
    let response = result?;
    if !is_success(response.status) {
        return Err(TransferError::HttpStatus(response.status));
    }

    Ok(TransferOutcome {
        bytes: length,
        response: Some(response.body),
    })
}

/// Turns the reader into a request body that reports progress per chunk and
/// stops at the first chunk boundary after cancellation.
fn body_stream(
    reader: ChunkReader,
    progress: ProgressReporter,
    cancel: CancellationToken,
) -> ByteStream {
    futures_util::stream::try_unfold(
        (reader, progress, cancel),
        |(mut reader, mut progress, cancel)| async move {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            match reader.next_chunk().await? {
                Some(chunk) => {
                    progress.advance(chunk.len() as u64);
                    Ok(Some((chunk, (reader, progress, cancel))))
                }
                None => Ok(None),
            }
        },
    )
    .boxed()
}
