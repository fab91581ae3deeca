//! The dedicated worker execution context.
//!
//! One OS thread hosts a Tokio runtime on which every executor runs. Tasks
//! talk to it only through messages: a [`TransferJob`] goes in, a stream of
//! [`ExecutorEvent`]s comes back. The only state shared across the boundary
//! is the job's cancellation token.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::run_download;
use crate::progress::ProgressReporter;
use crate::transport::Transport;
use crate::types::{ExecutorEvent, TransferJob, TransferRequest};
use crate::upload::run_upload;
use crate::{TransferConfig, TransferError};

struct WorkerCommand {
    job: TransferJob,
    reply: mpsc::UnboundedSender<ExecutorEvent>,
}

/// Cloneable handle used by tasks to dispatch jobs to the worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    dispatched: Arc<AtomicU64>,
}

impl WorkerHandle {
    /// Hands `job` to the worker and returns the channel its events arrive on.
    pub fn dispatch(
        &self,
        job: TransferJob,
    ) -> Result<mpsc::UnboundedReceiver<ExecutorEvent>, TransferError> {
        let (reply, events) = mpsc::unbounded_channel();
        self.tx
            .send(WorkerCommand { job, reply })
            .map_err(|_| TransferError::WorkerClosed)?;
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(events)
    }

    /// Number of executors created through this worker.
    pub fn jobs_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }
}

/// Owner of the worker thread.
///
/// Dropping it stops the worker without waiting; use
/// [`shutdown`](Self::shutdown) to wait for in-flight transfers.
pub struct TransferWorker {
    handle: WorkerHandle,
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl TransferWorker {
    /// Starts the worker thread.
    pub fn spawn(
        config: TransferConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, TransferError> {
        let config = Arc::new(config.normalized());
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = {
            let config = Arc::clone(&config);
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("linkxfer-worker".into())
                .spawn(move || {
                    let runtime = tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(config.worker_threads)
                        .thread_name("linkxfer-transfer")
                        .enable_all()
                        .build();
                    match runtime {
                        Ok(runtime) => {
                            let _ = ready_tx.send(Ok(()));
                            runtime.block_on(run_loop(rx, config, transport, stop));
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(TransferError::WorkerClosed),
        }
        info!(threads = config.worker_threads, "transfer worker started");

        Ok(Self {
            handle: WorkerHandle {
                tx,
                dispatched: Arc::new(AtomicU64::new(0)),
            },
            stop,
            thread: Some(thread),
        })
    }

    /// Returns a handle for dispatching jobs.
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stops accepting jobs, lets in-flight transfers finish, and joins the
    /// thread. Blocks the calling thread.
    pub fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("transfer worker thread panicked");
        }
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<WorkerCommand>,
    config: Arc<TransferConfig>,
    transport: Arc<dyn Transport>,
    stop: CancellationToken,
) {
    let mut jobs = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            Some(result) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "transfer job aborted");
                }
            }
            command = rx.recv() => match command {
                Some(command) => {
                    jobs.spawn(execute(command, Arc::clone(&config), Arc::clone(&transport)));
                }
                None => break,
            },
        }
    }

    // Queued commands are dropped unanswered; their tasks see a closed channel.
    rx.close();
    while let Some(result) = jobs.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "transfer job aborted");
        }
    }
    info!("transfer worker stopped");
}

async fn execute(
    command: WorkerCommand,
    config: Arc<TransferConfig>,
    transport: Arc<dyn Transport>,
) {
    let WorkerCommand { job, reply } = command;
    let mut progress = ProgressReporter::new(reply);
    debug!(local = %job.request.local_path().display(), "executor started");

    let result = match &job.request {
        TransferRequest::Download { url, local_path } => {
            run_download(
                transport.as_ref(),
                &config,
                url,
                local_path,
                &job.cancel,
                &mut progress,
            )
            .await
        }
        TransferRequest::Upload {
            url,
            parent_dir,
            local_path,
        } => {
            run_upload(
                transport.as_ref(),
                &config,
                url,
                parent_dir,
                local_path,
                &job.cancel,
                &mut progress,
            )
            .await
        }
    };

    let state = progress.state();
    match &result {
        Ok(outcome) => debug!(bytes = outcome.bytes, "executor finished"),
        Err(_) if state.canceled => debug!(
            transferred = state.bytes_transferred,
            total = state.bytes_total,
            "executor cancelled"
        ),
        Err(e) => warn!(error = %e, "executor failed"),
    }
    progress.finish(result);
}
