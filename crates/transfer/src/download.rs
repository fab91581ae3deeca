//! Download executor: GET into a staged temp file, then rename into place.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::progress::ProgressReporter;
use crate::transport::{Transport, is_success};
use crate::types::TransferOutcome;
use crate::{TransferConfig, TransferError};

/// Runs one download.
///
/// The staged file lives next to `local_path` so the final rename stays on
/// one filesystem. Every early return drops the [`TempPath`], which removes
/// the partial file; nothing appears at `local_path` unless the whole body
/// arrived.
pub(crate) async fn run_download(
    transport: &dyn Transport,
    config: &TransferConfig,
    url: &str,
    local_path: &Path,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<TransferOutcome, TransferError> {
    check_cancelled(cancel, progress)?;

    let (file, temp_path) = stage_file(local_path, &config.temp_prefix).await?;
    let mut file = tokio::fs::File::from_std(file);
    debug!(temp = %temp_path.display(), "staging download");

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            progress.mark_cancelled();
            return Err(TransferError::Cancelled);
        }
        response = transport.get(url) => response?,
    };
    if !is_success(response.status) {
        return Err(TransferError::HttpStatus(response.status));
    }
    progress.set_total(response.total.unwrap_or(0));

    let mut body = response.body;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                progress.mark_cancelled();
                return Err(TransferError::Cancelled);
            }
            next = body.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::local(&*temp_path, e))?;
        progress.advance(chunk.len() as u64);
    }
    drop(body);

    file.flush()
        .await
        .map_err(|e| TransferError::local(&*temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| TransferError::local(&*temp_path, e))?;
    drop(file);

    // Last boundary before the destination is touched.
    check_cancelled(cancel, progress)?;

    let bytes = progress.state().bytes_transferred;
    let target = local_path.to_path_buf();
    tokio::task::spawn_blocking(move || temp_path.persist(&target))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
        .map_err(|e| TransferError::local(local_path, e.error))?;

    Ok(TransferOutcome {
        bytes,
        response: None,
    })
}

/// Creates the staged temp file in the destination's directory.
async fn stage_file(
    local_path: &Path,
    prefix: &str,
) -> Result<(std::fs::File, TempPath), TransferError> {
    let dir = staging_dir(local_path);
    let prefix = prefix.to_string();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir).map_err(|e| TransferError::local(&dir, e))?;
        let staged = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(&dir)
            .map_err(|e| TransferError::local(&dir, e))?;
        Ok(staged.into_parts())
    })
    .await
    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}

fn staging_dir(local_path: &Path) -> PathBuf {
    match local_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn check_cancelled(
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        progress.mark_cancelled();
        Err(TransferError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, collect_events, staged_files};
    use crate::types::ExecutorEvent;
    use tokio::sync::mpsc;

    fn reporter() -> (ProgressReporter, mpsc::UnboundedReceiver<ExecutorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressReporter::new(tx), rx)
    }

    #[tokio::test]
    async fn happy_path_writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::chunks(vec![vec![1u8; 256]; 4], Some(1024));
        let (mut progress, mut rx) = reporter();

        let outcome = run_download(
            &transport,
            &TransferConfig::default(),
            "https://fs.example/dl/abc",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.bytes, 1024);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![1u8; 1024]);
        assert!(staged_files(dir.path()).is_empty());

        drop(progress);
        let (updates, finished) = collect_events(&mut rx).await;
        assert_eq!(
            updates,
            vec![(256, 1024), (512, 1024), (768, 1024), (1024, 1024)]
        );
        assert!(finished.is_none());
    }

    #[tokio::test]
    async fn overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, b"old contents that are longer").unwrap();
        let transport = ScriptedTransport::chunks(vec![b"new".to_vec()], None);
        let (mut progress, _rx) = reporter();

        run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn unknown_length_reports_zero_total() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::chunks(vec![vec![0u8; 10], vec![0u8; 5]], None);
        let (mut progress, mut rx) = reporter();

        run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();
        drop(progress);

        let (updates, _) = collect_events(&mut rx).await;
        assert_eq!(updates, vec![(10, 0), (15, 0)]);
    }

    #[tokio::test]
    async fn mid_stream_error_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::failing_after(vec![vec![2u8; 256]; 2], Some(1024));
        let (mut progress, _rx) = reporter();

        let result = run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await;

        assert!(matches!(result, Err(TransferError::Transport(_))));
        assert!(!dest.exists());
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::status(403);
        let (mut progress, _rx) = reporter();

        let result = run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await;
        assert!(matches!(result, Err(TransferError::HttpStatus(403))));
        assert!(!dest.exists());
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn tls_error_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::get_error(TransferError::Tls(
            "invalid peer certificate: UnknownIssuer".into(),
        ));
        let (mut progress, _rx) = reporter();

        let result = run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await;
        assert!(matches!(result, Err(TransferError::Tls(_))));
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn cancel_before_start_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let transport = ScriptedTransport::chunks(vec![vec![1u8; 8]], Some(8));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut progress, _rx) = reporter();

        let result = run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &cancel,
            &mut progress,
        )
        .await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(progress.state().canceled);
        assert_eq!(transport.get_calls(), 0);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancel_at_chunk_boundary_discards_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let (transport, gate) = ScriptedTransport::gated(vec![vec![3u8; 256]; 4], Some(1024), 2);
        let cancel = CancellationToken::new();
        let config = TransferConfig::default();
        let (mut progress, mut rx) = reporter();

        let run = run_download(
            &transport,
            &config,
            "u",
            &dest,
            &cancel,
            &mut progress,
        );
        let canceller = async {
            gate.reached().await;
            cancel.cancel();
            gate.release();
        };
        let (result, ()) = tokio::join!(run, canceller);

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(!dest.exists());
        assert!(staged_files(dir.path()).is_empty());

        drop(progress);
        let (updates, _) = collect_events(&mut rx).await;
        assert_eq!(updates, vec![(256, 1024), (512, 1024)]);
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/out.bin");
        let transport = ScriptedTransport::chunks(vec![b"xyz".to_vec()], Some(3));
        let (mut progress, _rx) = reporter();

        run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn rename_failure_discards_temp() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the destination makes the rename fail.
        let dest = dir.path().join("taken");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), b"k").unwrap();
        let transport = ScriptedTransport::chunks(vec![b"data".to_vec()], Some(4));
        let (mut progress, _rx) = reporter();

        let result = run_download(
            &transport,
            &TransferConfig::default(),
            "u",
            &dest,
            &CancellationToken::new(),
            &mut progress,
        )
        .await;

        assert!(matches!(result, Err(TransferError::LocalFile { .. })));
        assert!(dest.is_dir());
        assert!(staged_files(dir.path()).is_empty());
    }

    #[test]
    fn staging_dir_for_bare_filename() {
        assert_eq!(staging_dir(Path::new("file.txt")), PathBuf::from("."));
        assert_eq!(
            staging_dir(Path::new("/data/file.txt")),
            PathBuf::from("/data")
        );
    }
}
