//! Scripted in-memory [`Transport`] for tests.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! dependent crates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{Notify, mpsc};

use crate::TransferError;
use crate::transport::{ByteStream, DownloadResponse, Transport, UploadForm, UploadResponse};
use crate::types::{ExecutorEvent, TransferOutcome};

/// Rendezvous between a scripted transport and the test body.
///
/// The transport calls [`Gate::pause`] at a scripted point; the test waits
/// for [`Gate::reached`], acts, then calls [`Gate::release`].
#[derive(Debug, Default)]
pub struct Gate {
    reached: Notify,
    released: Notify,
}

impl Gate {
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn pause(&self) {
        self.reached.notify_one();
        self.released.notified().await;
    }
}

enum GetScript {
    Respond {
        status: u16,
        total: Option<u64>,
        chunks: Vec<Vec<u8>>,
        fail_at_end: bool,
        gate: Option<(usize, Arc<Gate>)>,
    },
    Error(TransferError),
}

enum PostScript {
    Accept {
        status: u16,
        body: String,
        gate: Option<(usize, Arc<Gate>)>,
    },
    Error(TransferError),
}

/// Form metadata recorded by [`ScriptedTransport::post_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedForm {
    pub parent_dir: String,
    pub file_name: String,
    pub length: u64,
}

/// One-shot scripted transport. A second call of the same kind fails.
pub struct ScriptedTransport {
    get_script: Mutex<Option<GetScript>>,
    post_script: Mutex<Option<PostScript>>,
    get_calls: AtomicUsize,
    post_calls: AtomicUsize,
    uploaded: Arc<Mutex<Vec<u8>>>,
    last_form: Mutex<Option<RecordedForm>>,
}

impl ScriptedTransport {
    fn new(get: Option<GetScript>, post: Option<PostScript>) -> Self {
        Self {
            get_script: Mutex::new(get),
            post_script: Mutex::new(post),
            get_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
            uploaded: Arc::new(Mutex::new(Vec::new())),
            last_form: Mutex::new(None),
        }
    }

    /// GET answers 200 and streams `chunks`.
    pub fn chunks(chunks: Vec<Vec<u8>>, total: Option<u64>) -> Self {
        Self::new(
            Some(GetScript::Respond {
                status: 200,
                total,
                chunks,
                fail_at_end: false,
                gate: None,
            }),
            None,
        )
    }

    /// GET streams `chunks`, then the connection breaks.
    pub fn failing_after(chunks: Vec<Vec<u8>>, total: Option<u64>) -> Self {
        Self::new(
            Some(GetScript::Respond {
                status: 200,
                total,
                chunks,
                fail_at_end: true,
                gate: None,
            }),
            None,
        )
    }

    /// GET streams `chunks`, pausing on the gate after `pause_after` chunks.
    pub fn gated(chunks: Vec<Vec<u8>>, total: Option<u64>, pause_after: usize) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let transport = Self::new(
            Some(GetScript::Respond {
                status: 200,
                total,
                chunks,
                fail_at_end: false,
                gate: Some((pause_after, Arc::clone(&gate))),
            }),
            None,
        );
        (transport, gate)
    }

    /// GET answers `status` with an empty body.
    pub fn status(status: u16) -> Self {
        Self::new(
            Some(GetScript::Respond {
                status,
                total: Some(0),
                chunks: Vec::new(),
                fail_at_end: false,
                gate: None,
            }),
            None,
        )
    }

    /// GET fails before headers.
    pub fn get_error(err: TransferError) -> Self {
        Self::new(Some(GetScript::Error(err)), None)
    }

    /// POST consumes the body and answers `status`.
    pub fn accepting(status: u16, body: &str) -> Self {
        Self::new(
            None,
            Some(PostScript::Accept {
                status,
                body: body.to_string(),
                gate: None,
            }),
        )
    }

    /// POST pauses on the gate after consuming `pause_after` body chunks.
    pub fn upload_gated(status: u16, pause_after: usize) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let transport = Self::new(
            None,
            Some(PostScript::Accept {
                status,
                body: String::new(),
                gate: Some((pause_after, Arc::clone(&gate))),
            }),
        );
        (transport, gate)
    }

    /// POST fails without reading the body.
    pub fn post_error(err: TransferError) -> Self {
        Self::new(None, Some(PostScript::Error(err)))
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    /// Body bytes consumed by POST so far.
    pub fn uploaded(&self) -> Vec<u8> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn last_form(&self) -> Option<RecordedForm> {
        self.last_form.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(
        &'a self,
        _url: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<DownloadResponse, TransferError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.get_script.lock().unwrap().take();
            match script {
                None => Err(TransferError::Transport("no scripted GET".into())),
                Some(GetScript::Error(e)) => Err(e),
                Some(GetScript::Respond {
                    status,
                    total,
                    chunks,
                    fail_at_end,
                    gate,
                }) => Ok(DownloadResponse {
                    status,
                    total,
                    body: scripted_body(chunks, fail_at_end, gate),
                }),
            }
        })
    }

    fn post_file<'a>(
        &'a self,
        _url: &'a str,
        form: UploadForm,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<UploadResponse, TransferError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.post_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_form.lock().unwrap() = Some(RecordedForm {
                parent_dir: form.parent_dir.clone(),
                file_name: form.file_name.clone(),
                length: form.length,
            });
            let script = self.post_script.lock().unwrap().take();
            let (status, body, gate) = match script {
                None => return Err(TransferError::Transport("no scripted POST".into())),
                Some(PostScript::Error(e)) => return Err(e),
                Some(PostScript::Accept { status, body, gate }) => (status, body, gate),
            };

            let mut stream = form.body;
            let mut consumed = 0usize;
            loop {
                if let Some((pause_after, gate)) = &gate
                    && consumed == *pause_after
                {
                    gate.pause().await;
                }
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        self.uploaded.lock().unwrap().extend_from_slice(&chunk);
                        consumed += 1;
                    }
                    Some(Err(e)) => {
                        return Err(TransferError::Transport(format!("body aborted: {e}")));
                    }
                    None => break,
                }
            }
            Ok(UploadResponse { status, body })
        })
    }
}

fn scripted_body(
    chunks: Vec<Vec<u8>>,
    fail_at_end: bool,
    gate: Option<(usize, Arc<Gate>)>,
) -> ByteStream {
    let items: Vec<Vec<u8>> = chunks;
    futures_util::stream::unfold(
        (items.into_iter(), 0usize, fail_at_end, gate),
        |(mut items, sent, fail_at_end, gate)| async move {
            if let Some((pause_after, gate)) = &gate
                && sent == *pause_after
            {
                gate.pause().await;
            }
            match items.next() {
                Some(chunk) => Some((
                    Ok(Bytes::from(chunk)),
                    (items, sent + 1, fail_at_end, gate),
                )),
                None if fail_at_end => Some((
                    Err(TransferError::Transport("connection reset by peer".into())),
                    (items, sent + 1, false, gate),
                )),
                None => None,
            }
        },
    )
    .boxed()
}

/// Drains `rx` until every sender is gone.
///
/// Returns the progress pairs in order and the terminal result, if any.
pub async fn collect_events(
    rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>,
) -> (Vec<(u64, u64)>, Option<Result<TransferOutcome, TransferError>>) {
    let mut updates = Vec::new();
    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            ExecutorEvent::Progress { transferred, total } => updates.push((transferred, total)),
            ExecutorEvent::Finished(result) => finished = Some(result),
        }
    }
    (updates, finished)
}

/// Staged download files left in `dir`.
pub fn staged_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(".part"))
                })
                .collect()
        })
        .unwrap_or_default()
}
