//! The two-phase transfer task.
//!
//! A [`TransferTask`] first asks the [`LinkResolver`] for a transfer link,
//! then hands a job to the shared transfer worker and relays its progress.
//! The owner observes [`TaskEvent`]s and always receives exactly one
//! `Finished`, whichever phase ended the task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkxfer_transfer::{ExecutorEvent, TransferError, TransferJob, WorkerHandle};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::direction::ResolvedLink;
use crate::error::TaskError;
use crate::resolver::{Account, LinkResolver};
use crate::types::{TaskDirection, TaskEvent, TaskState, TransferIdentity};

struct Inner {
    state: TaskState,
    last_transferred: u64,
    file_id: Option<String>,
    parent_dir: Option<String>,
    response: Option<String>,
    failure: Option<Arc<TaskError>>,
}

/// State shared between the task handle and its driver.
///
/// Every notification is sent while holding the lock, so a `Finished`
/// can never be overtaken by a late progress update.
struct Shared {
    inner: Mutex<Inner>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TaskEvent>,
    done: watch::Sender<Option<bool>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `ResolvingLink` to `Transferring` and records the link metadata.
    /// Returns `false` if the task was cancelled meanwhile.
    fn begin_transfer(&self, link: &ResolvedLink) -> bool {
        let mut inner = self.lock();
        if inner.state != TaskState::ResolvingLink {
            return false;
        }
        inner.state = TaskState::Transferring;
        match link {
            ResolvedLink::Download(link) => inner.file_id = Some(link.file_id.clone()),
            ResolvedLink::Upload(link) => inner.parent_dir = Some(link.parent_dir.clone()),
        }
        true
    }

    fn relay_progress(&self, transferred: u64, total: u64) {
        let mut inner = self.lock();
        if inner.state != TaskState::Transferring || transferred < inner.last_transferred {
            return;
        }
        inner.last_transferred = transferred;
        let _ = self.events.send(TaskEvent::Progress { transferred, total });
    }

    fn finish(&self, result: Result<(), TaskError>) {
        let mut inner = self.lock();
        self.finish_locked(&mut inner, result);
    }

    fn finish_locked(&self, inner: &mut Inner, result: Result<(), TaskError>) {
        if inner.state.is_finished() {
            return;
        }
        let success = result.is_ok();
        inner.state = TaskState::Finished { success };
        if let Err(e) = result {
            inner.failure = Some(Arc::new(e));
        }
        let _ = self.events.send(TaskEvent::Finished { success });
        self.done.send_replace(Some(success));
    }
}

/// One upload or download between a local file and a remote repository.
///
/// A task runs at most once; retrying means constructing a new task.
pub struct TransferTask {
    identity: Arc<TransferIdentity>,
    direction: TaskDirection,
    resolver: Arc<dyn LinkResolver>,
    worker: WorkerHandle,
    shared: Arc<Shared>,
    events_rx: Option<mpsc::UnboundedReceiver<TaskEvent>>,
}

impl TransferTask {
    /// Creates a task in the `Created` state.
    pub fn new(
        direction: TaskDirection,
        account: Account,
        repo_id: impl Into<String>,
        path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        resolver: Arc<dyn LinkResolver>,
        worker: WorkerHandle,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(None);
        Self {
            identity: Arc::new(TransferIdentity {
                account,
                repo_id: repo_id.into(),
                remote_path: path.into(),
                local_path: local_path.into(),
            }),
            direction,
            resolver,
            worker,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: TaskState::Created,
                    last_transferred: 0,
                    file_id: None,
                    parent_dir: None,
                    response: None,
                    failure: None,
                }),
                cancel: CancellationToken::new(),
                events,
                done,
            }),
            events_rx: Some(events_rx),
        }
    }

    /// Downloads remote `path` into `local_path`.
    pub fn download(
        account: Account,
        repo_id: impl Into<String>,
        path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        resolver: Arc<dyn LinkResolver>,
        worker: WorkerHandle,
    ) -> Self {
        Self::new(
            TaskDirection::Download,
            account,
            repo_id,
            path,
            local_path,
            resolver,
            worker,
        )
    }

    /// Uploads `local_path` into remote directory `path`.
    pub fn upload(
        account: Account,
        repo_id: impl Into<String>,
        path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        resolver: Arc<dyn LinkResolver>,
        worker: WorkerHandle,
    ) -> Self {
        Self::new(
            TaskDirection::Upload,
            account,
            repo_id,
            path,
            local_path,
            resolver,
            worker,
        )
    }

    /// Takes the event receiver (can only be called once).
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TaskEvent>> {
        self.events_rx.take()
    }

    /// Starts link resolution on the current Tokio runtime.
    ///
    /// Fails with [`TaskError::AlreadyStarted`] unless the task is still
    /// `Created`; the task is left untouched in that case.
    pub fn start(&self) -> Result<(), TaskError> {
        let runtime = {
            let mut inner = self.shared.lock();
            if inner.state != TaskState::Created {
                return Err(TaskError::AlreadyStarted);
            }
            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
            inner.state = TaskState::ResolvingLink;
            runtime
        };

        info!(
            direction = %self.direction,
            repo_id = %self.identity.repo_id,
            path = %self.identity.remote_path,
            "resolving transfer link"
        );
        runtime.spawn(drive(
            Arc::clone(&self.shared),
            self.direction,
            Arc::clone(&self.identity),
            Arc::clone(&self.resolver),
            self.worker.clone(),
        ));
        Ok(())
    }

    /// Aborts the task. Safe to call at any time; repeated calls and calls
    /// after `Finished` have no effect.
    ///
    /// A cancel that lands after a download was renamed into place, but
    /// before the task observed the executor's result, still finishes with
    /// `success: false`. The downloaded file stays at the local path.
    pub fn cancel(&self) {
        let mut inner = self.shared.lock();
        match inner.state {
            TaskState::Created => {
                info!(repo_id = %self.identity.repo_id, "task cancelled before start");
                self.shared.finish_locked(&mut inner, Err(TaskError::Cancelled));
            }
            TaskState::ResolvingLink | TaskState::Transferring => {
                info!(
                    repo_id = %self.identity.repo_id,
                    path = %self.identity.remote_path,
                    "cancelling task"
                );
                inner.state = TaskState::Canceling;
                self.shared.cancel.cancel();
            }
            TaskState::Canceling | TaskState::Finished { .. } => {}
        }
    }

    /// Waits for the terminal notification and returns its success flag.
    pub async fn wait(&self) -> bool {
        let mut done = self.shared.done.subscribe();
        done.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|finished| *finished)
            .unwrap_or(false)
    }

    pub fn state(&self) -> TaskState {
        self.shared.lock().state
    }

    pub fn direction(&self) -> TaskDirection {
        self.direction
    }

    pub fn repo_id(&self) -> &str {
        &self.identity.repo_id
    }

    pub fn path(&self) -> &str {
        &self.identity.remote_path
    }

    pub fn local_file_path(&self) -> &Path {
        &self.identity.local_path
    }

    pub fn file_name(&self) -> &str {
        self.identity.file_name()
    }

    /// Content identifier of a download, known once the link was resolved.
    pub fn file_id(&self) -> Option<String> {
        self.shared.lock().file_id.clone()
    }

    /// Remote directory of an upload, known once the link was resolved.
    pub fn parent_dir(&self) -> Option<String> {
        self.shared.lock().parent_dir.clone()
    }

    /// Body the file server returned for a successful upload.
    pub fn server_response(&self) -> Option<String> {
        self.shared.lock().response.clone()
    }

    /// Why the task finished unsuccessfully.
    pub fn failure(&self) -> Option<Arc<TaskError>> {
        self.shared.lock().failure.clone()
    }
}

async fn drive(
    shared: Arc<Shared>,
    direction: TaskDirection,
    identity: Arc<TransferIdentity>,
    resolver: Arc<dyn LinkResolver>,
    worker: WorkerHandle,
) {
    // Dropping the pending request on cancel means a late answer is ignored.
    let resolved = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => {
            shared.finish(Err(TaskError::Cancelled));
            return;
        }
        resolved = direction.request_link(resolver.as_ref(), &identity) => resolved,
    };

    let link = match resolved {
        Ok(link) => link,
        Err(e) => {
            warn!(
                %direction,
                repo_id = %identity.repo_id,
                path = %identity.remote_path,
                error = %e,
                "link resolution failed"
            );
            shared.finish(Err(e.into()));
            return;
        }
    };
    if !shared.begin_transfer(&link) {
        shared.finish(Err(TaskError::Cancelled));
        return;
    }

    let job = TransferJob {
        request: link.into_request(&identity),
        cancel: shared.cancel.clone(),
    };
    let mut events = match worker.dispatch(job) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "could not dispatch transfer");
            shared.finish(Err(e.into()));
            return;
        }
    };
    debug!(%direction, repo_id = %identity.repo_id, "transfer dispatched");

    let result = loop {
        match events.recv().await {
            Some(ExecutorEvent::Progress { transferred, total }) => {
                shared.relay_progress(transferred, total)
            }
            Some(ExecutorEvent::Finished(result)) => break result,
            None => break Err(TransferError::WorkerClosed),
        }
    };

    let result = match result {
        _ if shared.cancel.is_cancelled() => Err(TaskError::Cancelled),
        Ok(outcome) => {
            info!(
                %direction,
                repo_id = %identity.repo_id,
                path = %identity.remote_path,
                bytes = outcome.bytes,
                "transfer finished"
            );
            shared.lock().response = outcome.response;
            Ok(())
        }
        Err(e) => {
            warn!(
                %direction,
                repo_id = %identity.repo_id,
                path = %identity.remote_path,
                error = %e,
                "transfer failed"
            );
            Err(TaskError::Transfer(e))
        }
    };
    shared.finish(result);
}
